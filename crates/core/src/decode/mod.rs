use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const BYTES_PER_SAMPLE: usize = 2;

/// Layout of a raw little-endian 16-bit PCM stream. Raw PCM carries no header,
/// so this always travels out-of-band alongside the bytes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub const fn tts_mono_24khz() -> Self {
        Self::new(crate::config::TTS_SAMPLE_RATE_HZ, crate::config::TTS_CHANNELS)
    }

    pub fn frame_bytes(&self) -> usize {
        usize::from(self.channels) * BYTES_PER_SAMPLE
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(DecodeError::InvalidFormat(format!(
                "sample_rate={} channels={}",
                self.sample_rate, self.channels
            )));
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("pcm payload is empty")]
    Empty,

    #[error("pcm byte length {len} is not a whole number of {frame_bytes}-byte frames")]
    PartialFrame { len: usize, frame_bytes: usize },

    #[error("invalid pcm format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Decoded, seekable audio held in memory. Samples are interleaved and
/// normalized to `[-1.0, 1.0]`. Clones share the sample storage.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    format: PcmFormat,
    samples: Arc<[f32]>,
}

impl AudioBuffer {
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.format.channels)
    }

    /// Duration in seconds: frames / sample rate.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.format.sample_rate)
    }

    pub fn duration(&self) -> Duration {
        duration_from_sample_count(self.format.sample_rate, self.format.channels, self.samples.len())
    }

    /// Index of the first interleaved sample at `offset_secs`, clamped to the buffer.
    pub fn sample_index_at(&self, offset_secs: f64) -> usize {
        if !offset_secs.is_finite() || offset_secs <= 0.0 {
            return 0;
        }
        let frame = (offset_secs * f64::from(self.format.sample_rate)).floor() as usize;
        frame.min(self.frames()) * usize::from(self.format.channels)
    }
}

/// Decodes signed 16-bit little-endian PCM into an [`AudioBuffer`].
pub fn decode_pcm16le(raw: &[u8], format: PcmFormat) -> Result<AudioBuffer> {
    format.validate()?;
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    let frame_bytes = format.frame_bytes();
    if raw.len() % frame_bytes != 0 {
        return Err(DecodeError::PartialFrame {
            len: raw.len(),
            frame_bytes,
        });
    }

    let pcm: Vec<i16> = raw
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    let samples = i16_to_f32_pcm(&pcm);

    tracing::debug!(
        bytes = raw.len(),
        sample_rate = format.sample_rate,
        channels = format.channels,
        "decoded pcm payload"
    );

    Ok(AudioBuffer {
        format,
        samples: samples.into(),
    })
}

pub fn i16_to_f32_pcm(samples: &[i16]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let scale = 1.0f32 / 32768.0f32;
    samples.iter().map(|&s| f32::from(s) * scale).collect()
}

pub fn duration_from_sample_count(
    sample_rate_hz: u32,
    channels: u16,
    sample_count: usize,
) -> Duration {
    if sample_rate_hz == 0 || channels == 0 {
        return Duration::from_secs(0);
    }
    let frames = sample_count / usize::from(channels);
    let micros = (u128::from(frames as u64) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}
