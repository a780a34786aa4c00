mod audio;
mod context;
mod engine;
mod manual;
mod pitch;
mod ticker;

use crate::decode::AudioBuffer;

pub use audio::RodioAudioContext;
pub use context::AudioContextCell;
pub use engine::{PlaybackEngine, PlaybackState, PlaybackStatus, ProgressCallback};
pub use manual::{ManualAudioContext, StartedSource};
pub use pitch::PitchShift;
pub use ticker::{FrameTicker, FRAME_INTERVAL};

#[cfg(feature = "playback-device-enum")]
pub use audio::enumerate_output_device_names;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("audio output unavailable: {details}")]
    AudioOutputUnavailable { details: String },

    #[error("cannot play an empty audio buffer")]
    EmptyBuffer,
}

/// Parameters of one source -> gain -> destination graph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphParams {
    pub playback_rate: f64,
    pub detune_cents: f32,
    pub gain: f32,
}

/// A playing source node. Single use: once stopped it is discarded, and a
/// fresh one is started for every play action.
pub trait SourceHandle: Send {
    /// Stops output. Calling it on an already stopped source is a no-op.
    fn stop(&mut self);
}

/// The platform audio processing context: a monotonic clock plus the ability
/// to build a playback graph on the output device.
pub trait AudioContext: Send + Sync {
    /// Seconds since the context was created. Never goes backwards.
    fn current_time(&self) -> f64;

    /// Starts `buffer` at `offset_secs` (buffer time) through a fresh graph.
    fn start_source(
        &self,
        buffer: &AudioBuffer,
        params: GraphParams,
        offset_secs: f64,
    ) -> Result<Box<dyn SourceHandle>, PlaybackError>;
}
