use crate::playback::{AudioContext, PlaybackError};
use std::sync::{Arc, Mutex};

/// A minimal, poison-tolerant, lazy initializer for a single value.
pub(crate) struct LazyInit<T> {
    value: Mutex<Option<T>>,
}

impl<T> LazyInit<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    pub(crate) fn get_or_try_init_with<R, E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
        f: impl FnOnce(&T) -> R,
        invariant_err: impl FnOnce() -> E,
    ) -> Result<R, E> {
        let mut guard = match self.value.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("lazy audio resource lock was poisoned; recovering and continuing");
                poisoned.into_inner()
            }
        };

        // NOTE: `init` is used at most once (only when the cache is empty).
        if guard.is_none() {
            *guard = Some(init()?);
        }

        match guard.as_ref() {
            Some(v) => Ok(f(v)),
            None => Err(invariant_err()),
        }
    }

    pub(crate) fn is_initialized(&self) -> bool {
        match self.value.lock() {
            Ok(g) => g.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }
}

type ContextFactory =
    Box<dyn Fn() -> Result<Arc<dyn AudioContext>, PlaybackError> + Send + Sync>;

/// Process-wide accessor for the audio context.
///
/// The factory runs at most once, on the first successful [`get`](Self::get);
/// every later call returns the same context and it is never torn down while
/// the cell lives. A failed initialization is not cached, so the next call
/// retries. Tests construct the cell with a factory returning a fake context.
pub struct AudioContextCell {
    context: LazyInit<Arc<dyn AudioContext>>,
    factory: ContextFactory,
}

impl AudioContextCell {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn AudioContext>, PlaybackError> + Send + Sync + 'static,
    {
        Self {
            context: LazyInit::new(),
            factory: Box::new(factory),
        }
    }

    /// A cell already holding `context`.
    pub fn with_context(context: Arc<dyn AudioContext>) -> Self {
        Self::new(move || Ok(Arc::clone(&context)))
    }

    pub fn get(&self) -> Result<Arc<dyn AudioContext>, PlaybackError> {
        self.context.get_or_try_init_with(
            || {
                tracing::debug!("creating audio context");
                (self.factory)()
            },
            Arc::clone,
            || PlaybackError::AudioOutputUnavailable {
                details: "internal error: audio context cache invariant violated".to_owned(),
            },
        )
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_initialized()
    }
}
