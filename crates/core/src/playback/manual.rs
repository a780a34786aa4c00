use crate::decode::AudioBuffer;
use crate::playback::{AudioContext, GraphParams, PlaybackError, SourceHandle};
use std::sync::{Arc, Mutex, MutexGuard};

/// One source started on a [`ManualAudioContext`].
#[derive(Clone, Debug, PartialEq)]
pub struct StartedSource {
    pub params: GraphParams,
    pub offset_secs: f64,
    pub started_at: f64,
    pub stopped_at: Option<f64>,
}

#[derive(Debug, Default)]
struct ManualState {
    now: f64,
    sources: Vec<StartedSource>,
}

/// A silent audio context whose clock only moves when told to. Every started
/// source is recorded so callers can inspect the graphs that were built.
#[derive(Clone, Debug, Default)]
pub struct ManualAudioContext {
    state: Arc<Mutex<ManualState>>,
}

fn lock(state: &Mutex<ManualState>) -> MutexGuard<'_, ManualState> {
    match state.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ManualAudioContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, secs: f64) {
        lock(&self.state).now += secs;
    }

    pub fn set_time(&self, secs: f64) {
        let mut state = lock(&self.state);
        state.now = secs.max(state.now);
    }

    pub fn sources(&self) -> Vec<StartedSource> {
        lock(&self.state).sources.clone()
    }

    pub fn last_source(&self) -> Option<StartedSource> {
        lock(&self.state).sources.last().cloned()
    }

    /// Sources started and not yet stopped.
    pub fn active_sources(&self) -> usize {
        lock(&self.state)
            .sources
            .iter()
            .filter(|s| s.stopped_at.is_none())
            .count()
    }
}

impl AudioContext for ManualAudioContext {
    fn current_time(&self) -> f64 {
        lock(&self.state).now
    }

    fn start_source(
        &self,
        buffer: &AudioBuffer,
        params: GraphParams,
        offset_secs: f64,
    ) -> Result<Box<dyn SourceHandle>, PlaybackError> {
        if buffer.frames() == 0 {
            return Err(PlaybackError::EmptyBuffer);
        }
        let mut state = lock(&self.state);
        let started_at = state.now;
        state.sources.push(StartedSource {
            params,
            offset_secs,
            started_at,
            stopped_at: None,
        });
        Ok(Box::new(ManualSource {
            index: state.sources.len() - 1,
            state: Arc::clone(&self.state),
        }))
    }
}

struct ManualSource {
    index: usize,
    state: Arc<Mutex<ManualState>>,
}

impl SourceHandle for ManualSource {
    fn stop(&mut self) {
        let mut state = lock(&self.state);
        let now = state.now;
        if let Some(source) = state.sources.get_mut(self.index) {
            if source.stopped_at.is_none() {
                source.stopped_at = Some(now);
            }
        }
    }
}

impl Drop for ManualSource {
    fn drop(&mut self) {
        self.stop();
    }
}
