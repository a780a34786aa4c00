use crate::decode::AudioBuffer;
use crate::playback::{
    AudioContext, AudioContextCell, FrameTicker, GraphParams, PlaybackError, SourceHandle,
};
use crate::settings::SpeechSettings;
use serde::Serialize;
use std::sync::Arc;

pub type ProgressCallback = Box<dyn FnMut(f64) + Send>;

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Paused,
    Finished,
}

/// Transport position. While playing, `position` is always derived from the
/// audio clock (`(now - start_clock_time) * rate`), never accumulated.
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    /// Buffer seconds.
    pub position: f64,
    /// Audio-clock time at which buffer position 0 would have played.
    pub start_clock_time: f64,
    /// Buffer seconds where the next play resumes.
    pub paused_offset: f64,
}

/// Drives one buffer through the audio context: play, pause, resume, stop,
/// and frame-cadence progress reporting.
pub struct PlaybackEngine {
    contexts: Arc<AudioContextCell>,
    clock: Option<Arc<dyn AudioContext>>,
    source: Option<Box<dyn SourceHandle>>,
    state: PlaybackState,
    rate: f64,
    duration: f64,
    ticker: FrameTicker,
    on_progress: Option<ProgressCallback>,
}

impl PlaybackEngine {
    pub fn new(contexts: Arc<AudioContextCell>) -> Self {
        Self::with_ticker(contexts, FrameTicker::default())
    }

    pub fn with_ticker(contexts: Arc<AudioContextCell>, ticker: FrameTicker) -> Self {
        Self {
            contexts,
            clock: None,
            source: None,
            state: PlaybackState::default(),
            rate: 1.0,
            duration: 0.0,
            ticker,
            on_progress: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.status
    }

    pub fn is_playing(&self) -> bool {
        self.state.status == PlaybackStatus::Playing
    }

    pub fn position(&self) -> f64 {
        self.state.position
    }

    /// Duration of the buffer most recently played, in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn playback_rate(&self) -> f64 {
        self.rate
    }

    pub fn ticker_active(&self) -> bool {
        self.ticker.is_active()
    }

    /// Registers the callback invoked with elapsed buffer seconds on every frame while playing.
    pub fn on_progress(&mut self, callback: impl FnMut(f64) + Send + 'static) {
        self.on_progress = Some(Box::new(callback));
    }

    /// Starts `buffer` from `from_offset` buffer seconds through a fresh graph.
    ///
    /// Any running source is stopped first. An offset at or past the end of
    /// the clip (or otherwise out of range) restarts from 0.
    pub fn play(
        &mut self,
        buffer: &AudioBuffer,
        settings: &SpeechSettings,
        from_offset: f64,
    ) -> Result<(), PlaybackError> {
        let context = self.contexts.get()?;
        self.teardown_source();

        let duration = buffer.duration_secs();
        let offset = if from_offset.is_finite() && from_offset > 0.0 && from_offset < duration {
            from_offset
        } else {
            0.0
        };
        let rate = settings.playback_rate();
        let params = GraphParams {
            playback_rate: rate,
            detune_cents: settings.pitch.detune_cents(),
            gain: settings.volume,
        };

        let source = match context.start_source(buffer, params, offset) {
            Ok(s) => s,
            Err(e) => {
                self.ticker.cancel();
                self.state.status = if offset > 0.0 {
                    PlaybackStatus::Paused
                } else {
                    PlaybackStatus::Idle
                };
                self.state.position = offset;
                self.state.paused_offset = offset;
                return Err(e);
            }
        };

        // The clock runs in wall time while the playhead advances at `rate`.
        let start_clock_time = context.current_time() - offset / rate;
        self.source = Some(source);
        self.clock = Some(context);
        self.rate = rate;
        self.duration = duration;
        self.state = PlaybackState {
            status: PlaybackStatus::Playing,
            position: offset,
            start_clock_time,
            paused_offset: offset,
        };
        self.ticker.start();

        tracing::debug!(
            offset,
            rate,
            detune_cents = params.detune_cents,
            gain = params.gain,
            duration,
            "playback started"
        );
        Ok(())
    }

    /// Resumes from the paused offset (or from 0 after the clip finished).
    pub fn resume(
        &mut self,
        buffer: &AudioBuffer,
        settings: &SpeechSettings,
    ) -> Result<(), PlaybackError> {
        let offset = self.state.paused_offset;
        self.play(buffer, settings, offset)
    }

    pub fn pause(&mut self) {
        if self.state.status != PlaybackStatus::Playing {
            return;
        }
        let position = self.elapsed().min(self.duration);
        self.teardown_source();
        self.ticker.cancel();
        self.state.status = PlaybackStatus::Paused;
        self.state.position = position;
        self.state.paused_offset = position;
        tracing::debug!(position, "playback paused");
    }

    /// Tears down any source, cancels progress updates and rewinds to 0.
    /// Safe to call in any state.
    pub fn stop(&mut self) {
        self.teardown_source();
        self.ticker.cancel();
        self.state = PlaybackState::default();
    }

    /// Recomputes the position from the audio clock and reports it.
    ///
    /// Reaching the end of the clip stops the source and pins the position
    /// to the duration. Returns the reported position, or `None` when not
    /// playing.
    pub fn tick(&mut self) -> Option<f64> {
        if self.state.status != PlaybackStatus::Playing {
            return None;
        }
        let elapsed = self.elapsed();
        if elapsed >= self.duration {
            self.teardown_source();
            self.ticker.cancel();
            self.state.status = PlaybackStatus::Finished;
            self.state.position = self.duration;
            self.state.paused_offset = self.duration;
            tracing::debug!(duration = self.duration, "playback finished");
        } else {
            self.state.position = elapsed;
        }
        let position = self.state.position;
        if let Some(cb) = self.on_progress.as_mut() {
            cb(position);
        }
        Some(position)
    }

    /// Waits for the next frame and ticks. Never resolves while not playing.
    pub async fn next_frame(&mut self) -> Option<f64> {
        self.ticker.next_frame().await;
        self.tick()
    }

    fn elapsed(&self) -> f64 {
        match &self.clock {
            Some(clock) => ((clock.current_time() - self.state.start_clock_time) * self.rate).max(0.0),
            None => 0.0,
        }
    }

    fn teardown_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.teardown_source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{decode_pcm16le, PcmFormat};
    use crate::playback::ManualAudioContext;
    use crate::settings::Pitch;
    use std::sync::Mutex;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// Two seconds of silence at 100 Hz mono.
    fn two_second_buffer() -> AudioBuffer {
        decode_pcm16le(&[0u8; 400], PcmFormat::new(100, 1)).unwrap()
    }

    fn engine() -> (PlaybackEngine, ManualAudioContext) {
        let ctx = ManualAudioContext::new();
        let cell = Arc::new(AudioContextCell::with_context(Arc::new(ctx.clone())));
        (PlaybackEngine::new(cell), ctx)
    }

    #[test]
    fn play_builds_graph_from_settings() {
        let (mut engine, ctx) = engine();
        let settings = SpeechSettings {
            speed: 2.0,
            pitch: Pitch::High,
            volume: 0.5,
        };
        engine.play(&two_second_buffer(), &settings, 0.0).unwrap();

        let src = ctx.last_source().unwrap();
        assert!(close(src.params.playback_rate, 1.4));
        assert_eq!(src.params.detune_cents, 350.0);
        assert_eq!(src.params.gain, 0.5);
        assert_eq!(engine.status(), PlaybackStatus::Playing);
        assert!(engine.ticker_active());
    }

    #[test]
    fn progress_follows_the_audio_clock() {
        let (mut engine, ctx) = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        engine.on_progress({
            let seen = Arc::clone(&seen);
            move |p| seen.lock().unwrap().push(p)
        });
        engine
            .play(&two_second_buffer(), &SpeechSettings::default(), 0.0)
            .unwrap();

        ctx.advance(0.25);
        assert_eq!(engine.tick(), Some(0.25));
        ctx.advance(0.25);
        assert_eq!(engine.tick(), Some(0.5));
        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.5]);
    }

    #[test]
    fn natural_end_pins_position_to_duration() {
        let (mut engine, ctx) = engine();
        let buffer = two_second_buffer();
        engine.play(&buffer, &SpeechSettings::default(), 0.0).unwrap();

        ctx.advance(buffer.duration_secs());
        assert_eq!(engine.tick(), Some(2.0));
        assert_eq!(engine.status(), PlaybackStatus::Finished);
        assert_eq!(engine.position(), 2.0);
        assert_eq!(ctx.active_sources(), 0);
        assert!(!engine.ticker_active());

        ctx.advance(1.0);
        assert_eq!(engine.tick(), None);
        assert_eq!(engine.position(), 2.0);
    }

    #[test]
    fn late_frame_never_reports_past_the_end() {
        let (mut engine, ctx) = engine();
        engine
            .play(&two_second_buffer(), &SpeechSettings::default().with_speed(2.0), 0.0)
            .unwrap();
        ctx.advance(5.0);
        assert_eq!(engine.tick(), Some(2.0));
    }

    #[test]
    fn pause_and_resume_continue_from_the_same_point() {
        let (mut engine, ctx) = engine();
        let buffer = two_second_buffer();
        let settings = SpeechSettings::default().with_speed(1.5);
        engine.play(&buffer, &settings, 0.0).unwrap();

        ctx.advance(1.0);
        engine.pause();
        let paused_at = engine.position();
        assert!(close(paused_at, 1.2));
        assert_eq!(engine.status(), PlaybackStatus::Paused);
        assert_eq!(ctx.active_sources(), 0);
        assert!(!engine.ticker_active());

        ctx.advance(3.0);
        assert_eq!(engine.tick(), None);

        engine.resume(&buffer, &settings).unwrap();
        assert!(close(ctx.last_source().unwrap().offset_secs, 1.2));
        assert!(close(engine.tick().unwrap(), 1.2));

        ctx.advance(0.5);
        assert!(close(engine.tick().unwrap(), 1.8));
    }

    #[test]
    fn resume_after_finish_restarts_from_zero() {
        let (mut engine, ctx) = engine();
        let buffer = two_second_buffer();
        engine.play(&buffer, &SpeechSettings::default(), 0.0).unwrap();
        ctx.advance(2.0);
        engine.tick();

        engine.resume(&buffer, &SpeechSettings::default()).unwrap();
        assert_eq!(ctx.last_source().unwrap().offset_secs, 0.0);
        assert_eq!(engine.position(), 0.0);
    }

    #[test]
    fn out_of_range_offsets_start_from_zero() {
        let (mut engine, ctx) = engine();
        let buffer = two_second_buffer();
        for offset in [-1.0, 2.0, 9.0, f64::NAN] {
            engine.play(&buffer, &SpeechSettings::default(), offset).unwrap();
            assert_eq!(ctx.last_source().unwrap().offset_secs, 0.0);
        }
    }

    #[test]
    fn new_play_tears_down_previous_source() {
        let (mut engine, ctx) = engine();
        let buffer = two_second_buffer();
        engine.play(&buffer, &SpeechSettings::default(), 0.0).unwrap();
        engine.play(&buffer, &SpeechSettings::default(), 0.0).unwrap();
        assert_eq!(ctx.sources().len(), 2);
        assert_eq!(ctx.active_sources(), 1);
    }

    #[test]
    fn stop_is_idempotent_and_rewinds() {
        let (mut engine, ctx) = engine();
        engine
            .play(&two_second_buffer(), &SpeechSettings::default(), 0.0)
            .unwrap();
        ctx.advance(0.7);
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::default());
        assert_eq!(ctx.active_sources(), 0);
        assert!(!engine.ticker_active());
    }

    #[test]
    fn settings_changed_while_paused_apply_to_next_play_only() {
        let (mut engine, ctx) = engine();
        let buffer = two_second_buffer();
        engine.play(&buffer, &SpeechSettings::default(), 0.0).unwrap();
        ctx.advance(0.5);
        engine.pause();

        let quieter_lower = SpeechSettings {
            pitch: Pitch::Low,
            volume: 0.3,
            ..SpeechSettings::default()
        };
        engine.resume(&buffer, &quieter_lower).unwrap();

        let sources = ctx.sources();
        assert_eq!(sources[0].params.detune_cents, 0.0);
        assert_eq!(sources[0].params.gain, 1.0);
        assert_eq!(sources[1].params.detune_cents, -350.0);
        assert_eq!(sources[1].params.gain, 0.3);
    }

    #[test]
    fn pause_when_not_playing_is_a_no_op() {
        let (mut engine, _ctx) = engine();
        engine.pause();
        assert_eq!(engine.status(), PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn next_frame_reports_progress_while_playing() {
        let (mut engine, ctx) = engine();
        engine
            .play(&two_second_buffer(), &SpeechSettings::default(), 0.0)
            .unwrap();
        ctx.advance(0.1);
        assert_eq!(engine.next_frame().await, Some(0.1));
    }
}
