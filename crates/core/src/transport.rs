//! Application state machine tying text input, speech generation and
//! playback together.
//!
//! Every edit that changes what would be spoken (text, voice, pitch) bumps a
//! request sequence number. A generation started before the bump is stale
//! when it completes and its result is dropped without touching playback.

use crate::config::{ConfigError, DEFAULT_TEXT, GENERATION_FAILED_MESSAGE, MAX_CHARS, PRODUCT_NAME};
use crate::decode::{decode_pcm16le, AudioBuffer, DecodeError};
use crate::playback::{AudioContextCell, PlaybackEngine, PlaybackError, PlaybackStatus};
use crate::settings::{Pitch, SpeechSettings};
use crate::tts::{TtsAudio, TtsClient, TtsError, TtsRequest};
use crate::voice::{default_voice, find_voice, VoiceOption};
use crate::wav::{pcm_to_wav, WavError, WAV_EXTENSION};
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LOG_TARGET: &str = "transport";

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("text is empty")]
    EmptyText,

    #[error("text has {chars} characters; the limit is {limit}")]
    OverLimit { chars: usize, limit: usize },

    #[error("a generation is already in progress")]
    Busy,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("failed to write {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that can go wrong between the backend call and a playable clip.
#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Tts(#[from] TtsError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("wav encoding failed: {0}")]
    Encode(#[from] WavError),
}

/// A generated clip: the decoded buffer for playback and the WAV file for export.
#[derive(Clone, Debug)]
pub struct GeneratedAudio {
    wav: Bytes,
    buffer: AudioBuffer,
}

impl GeneratedAudio {
    pub fn from_tts(audio: &TtsAudio) -> Result<Self, GenerationError> {
        let buffer = decode_pcm16le(&audio.pcm, audio.format)?;
        let wav = pcm_to_wav(&audio.pcm, audio.format)?;
        Ok(Self {
            wav: Bytes::from(wav),
            buffer,
        })
    }

    pub fn wav(&self) -> &Bytes {
        &self.wav
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer.duration_secs()
    }
}

/// Proof that a generation was admitted. Hand it back to
/// [`TransportController::complete_generation`] with the backend result.
#[derive(Debug)]
pub struct GenerationTicket {
    id: u64,
    request: TtsRequest,
}

impl GenerationTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &TtsRequest {
        &self.request
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Audio stored and playback started.
    Ready,
    /// The user-visible error is set and no audio is held.
    Failed,
    /// The inputs changed while the request was in flight; result dropped.
    Stale,
}

/// Snapshot of everything a front-end needs to render.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TransportView {
    pub char_count: usize,
    pub max_chars: usize,
    pub over_limit: bool,
    pub can_generate: bool,
    pub busy: bool,
    pub has_audio: bool,
    pub voice_id: &'static str,
    pub settings: SpeechSettings,
    pub status: PlaybackStatus,
    pub position: f64,
    pub duration: f64,
    pub progress: f64,
    pub error: Option<String>,
}

impl TransportView {
    /// `m:ss / m:ss`
    pub fn time_label(&self) -> String {
        format!("{} / {}", format_time(self.position), format_time(self.duration))
    }
}

/// Formats seconds as `m:ss`, truncating fractions.
pub fn format_time(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

pub struct TransportController {
    text: String,
    voice: &'static VoiceOption,
    settings: SpeechSettings,
    audio: Option<GeneratedAudio>,
    error: Option<String>,
    busy: bool,
    request_seq: u64,
    in_flight: Option<u64>,
    engine: PlaybackEngine,
}

impl TransportController {
    pub fn new(engine: PlaybackEngine) -> Self {
        Self {
            text: DEFAULT_TEXT.to_owned(),
            voice: default_voice(),
            settings: SpeechSettings::default(),
            audio: None,
            error: None,
            busy: false,
            request_seq: 0,
            in_flight: None,
            engine,
        }
    }

    pub fn with_audio_contexts(contexts: Arc<AudioContextCell>) -> Self {
        Self::new(PlaybackEngine::new(contexts))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> &'static VoiceOption {
        self.voice
    }

    pub fn settings(&self) -> SpeechSettings {
        self.settings
    }

    pub fn audio(&self) -> Option<&GeneratedAudio> {
        self.audio.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn status(&self) -> PlaybackStatus {
        self.engine.status()
    }

    pub fn position(&self) -> f64 {
        self.engine.position()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.text {
            self.text = text;
            self.invalidate("text changed");
        }
    }

    pub fn select_voice(&mut self, id: &str) -> Result<(), TransportError> {
        let voice = find_voice(id)?;
        if voice.id != self.voice.id {
            self.voice = voice;
            self.invalidate("voice changed");
        }
        Ok(())
    }

    pub fn set_pitch(&mut self, pitch: Pitch) {
        if pitch != self.settings.pitch {
            self.settings.pitch = pitch;
            self.invalidate("pitch changed");
        }
    }

    /// Takes effect on the next play; held audio is kept.
    pub fn set_speed(&mut self, ui_speed: f64) {
        self.settings = self.settings.with_speed(ui_speed);
    }

    /// Takes effect on the next play; held audio is kept.
    pub fn set_volume(&mut self, volume: f32) {
        self.settings = self.settings.with_volume(volume);
    }

    pub fn on_progress(&mut self, callback: impl FnMut(f64) + Send + 'static) {
        self.engine.on_progress(callback);
    }

    fn validate_text(&self) -> Result<(), TransportError> {
        if self.text.trim().is_empty() {
            return Err(TransportError::EmptyText);
        }
        let chars = self.char_count();
        if chars > MAX_CHARS {
            return Err(TransportError::OverLimit {
                chars,
                limit: MAX_CHARS,
            });
        }
        Ok(())
    }

    pub fn can_generate(&self) -> bool {
        !self.busy && self.validate_text().is_ok()
    }

    /// Admits a generation: validates the text, stops playback, drops any
    /// held audio and marks the controller busy.
    pub fn begin_generation(&mut self) -> Result<GenerationTicket, TransportError> {
        if self.busy {
            return Err(TransportError::Busy);
        }
        self.validate_text()?;

        self.engine.stop();
        self.audio = None;
        self.error = None;
        self.request_seq += 1;
        self.in_flight = Some(self.request_seq);
        self.busy = true;

        tracing::info!(
            target: LOG_TARGET,
            request = self.request_seq,
            voice = %self.voice.id,
            chars = self.char_count(),
            "generating speech"
        );
        Ok(GenerationTicket {
            id: self.request_seq,
            request: TtsRequest::for_voice(self.text.clone(), self.voice),
        })
    }

    /// Applies a backend result. Always clears the busy flag for the ticket's
    /// request; only a current ticket may store audio or set the error.
    pub fn complete_generation(
        &mut self,
        ticket: GenerationTicket,
        result: Result<TtsAudio, TtsError>,
    ) -> GenerationOutcome {
        if self.in_flight == Some(ticket.id) {
            self.in_flight = None;
            self.busy = false;
        }
        if ticket.id != self.request_seq {
            tracing::debug!(
                target: LOG_TARGET,
                request = ticket.id,
                current = self.request_seq,
                "dropping stale generation result"
            );
            return GenerationOutcome::Stale;
        }

        let generated = result
            .map_err(GenerationError::from)
            .and_then(|audio| GeneratedAudio::from_tts(&audio));

        match generated {
            Ok(audio) => {
                tracing::info!(
                    target: LOG_TARGET,
                    request = ticket.id,
                    duration_secs = audio.duration_secs(),
                    wav_bytes = audio.wav().len(),
                    "speech ready"
                );
                let audio = self.audio.insert(audio);
                if let Err(e) = self.engine.play(audio.buffer(), &self.settings, 0.0) {
                    tracing::warn!(target: LOG_TARGET, error = %e, "auto-play failed");
                    self.error = Some(e.to_string());
                }
                GenerationOutcome::Ready
            }
            Err(e) => {
                tracing::error!(
                    target: LOG_TARGET,
                    request = ticket.id,
                    error = %e,
                    "speech generation failed"
                );
                self.audio = None;
                self.error = Some(GENERATION_FAILED_MESSAGE.to_owned());
                GenerationOutcome::Failed
            }
        }
    }

    /// Runs a whole generation against `tts` in place.
    pub async fn generate(
        &mut self,
        tts: &dyn TtsClient,
    ) -> Result<GenerationOutcome, TransportError> {
        let ticket = self.begin_generation()?;
        let result = tts.synthesize(ticket.request.clone()).await;
        Ok(self.complete_generation(ticket, result))
    }

    /// Pauses while playing, otherwise (re)starts from the paused offset.
    /// Does nothing when no audio is held.
    pub fn toggle_play_pause(&mut self) -> Result<(), TransportError> {
        let Some(audio) = self.audio.as_ref() else {
            return Ok(());
        };
        if self.engine.is_playing() {
            self.engine.pause();
        } else {
            self.engine.resume(audio.buffer(), &self.settings)?;
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    /// Clears text, audio and error and restores default settings.
    pub fn reset(&mut self) {
        self.engine.stop();
        self.text.clear();
        self.audio = None;
        self.error = None;
        self.settings = SpeechSettings::default();
        self.request_seq += 1;
        tracing::debug!(target: LOG_TARGET, "transport reset");
    }

    /// `<product>-tts-<voiceId>.wav`
    pub fn export_file_name(&self) -> String {
        format!("{PRODUCT_NAME}-tts-{}.{WAV_EXTENSION}", self.voice.id)
    }

    /// Writes the held WAV into `dir`. Returns `None` when no audio is held.
    pub fn download(&self, dir: &Path) -> Result<Option<PathBuf>, TransportError> {
        let Some(audio) = self.audio.as_ref() else {
            return Ok(None);
        };
        let path = dir.join(self.export_file_name());
        std::fs::write(&path, audio.wav()).map_err(|source| TransportError::Export {
            path: path.clone(),
            source,
        })?;
        tracing::info!(target: LOG_TARGET, path = %path.display(), bytes = audio.wav().len(), "exported wav");
        Ok(Some(path))
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.engine.tick()
    }

    /// Waits for the next display frame while playing. Never resolves otherwise.
    pub async fn next_frame(&mut self) -> Option<f64> {
        self.engine.next_frame().await
    }

    pub fn view(&self) -> TransportView {
        let char_count = self.char_count();
        let duration = self
            .audio
            .as_ref()
            .map(GeneratedAudio::duration_secs)
            .unwrap_or(0.0);
        let position = self.engine.position();
        TransportView {
            char_count,
            max_chars: MAX_CHARS,
            over_limit: char_count > MAX_CHARS,
            can_generate: self.can_generate(),
            busy: self.busy,
            has_audio: self.audio.is_some(),
            voice_id: self.voice.id,
            settings: self.settings,
            status: self.engine.status(),
            position,
            duration,
            progress: if duration > 0.0 {
                (position / duration).clamp(0.0, 1.0)
            } else {
                0.0
            },
            error: self.error.clone(),
        }
    }

    fn invalidate(&mut self, reason: &'static str) {
        self.request_seq += 1;
        self.engine.stop();
        if self.audio.take().is_some() {
            tracing::debug!(target: LOG_TARGET, reason, "discarded generated audio");
        }
    }
}
