use crate::decode::AudioBuffer;
use crate::playback::context::LazyInit;
use crate::playback::{AudioContext, GraphParams, PitchShift, PlaybackError, SourceHandle};
use rodio::cpal::traits::DeviceTrait;
use rodio::cpal::traits::HostTrait;
use rodio::source::Source;
use rodio::{OutputStream, OutputStreamBuilder, Sink, StreamError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct RateLimitedWarn {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimitedWarn {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    fn should_log(&self) -> bool {
        let mut guard = match self.last.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        match *guard {
            None => {
                *guard = Some(now);
                true
            }
            Some(prev) if now.duration_since(prev) >= self.interval => {
                *guard = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}

/// Audio context backed by a rodio output stream.
///
/// The [`OutputStream`] is opened on the first play and kept for the life of
/// the context; every play connects a new [`Sink`] to its mixer. The clock is
/// monotonic wall time since construction.
pub struct RodioAudioContext {
    output_device_name: Option<String>,
    created_at: Instant,
    output_stream: LazyInit<OutputStream>,
    output_stream_open_attempts: AtomicUsize,
    blank_audio_warn: RateLimitedWarn,
}

impl RodioAudioContext {
    pub fn new() -> Self {
        Self {
            output_device_name: None,
            created_at: Instant::now(),
            output_stream: LazyInit::new(),
            output_stream_open_attempts: AtomicUsize::new(0),
            blank_audio_warn: RateLimitedWarn::new(Duration::from_secs(5)),
        }
    }

    pub fn with_output_device_name<S: Into<String>>(mut self, name: S) -> Self {
        self.output_device_name = Some(name.into());
        self
    }

    fn open_output_stream(&self) -> Result<OutputStream, PlaybackError> {
        let attempt = self
            .output_stream_open_attempts
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        tracing::debug!(
            attempt,
            configured_output_device = %self.output_device_name.as_deref().unwrap_or("<default>"),
            "opening rodio OutputStream"
        );

        let Some(wanted) = self.output_device_name.as_deref() else {
            return open_default_stream(None, "open default output stream");
        };

        match open_named_output_stream(wanted) {
            Ok(stream) => Ok(stream),
            Err(NamedDeviceStreamError::DeviceNotFound { wanted, available }) => {
                tracing::warn!(
                    wanted_device = %wanted,
                    available_devices = %format_device_list(&available),
                    "configured output device not found; falling back to default output device"
                );
                open_default_stream(
                    Some(wanted.as_str()),
                    "default-device fallback after named device not found",
                )
            }
            Err(NamedDeviceStreamError::OpenFailed {
                wanted,
                error,
                available,
            }) => {
                tracing::warn!(
                    wanted_device = %wanted,
                    error = %error,
                    available_devices = %format_device_list(&available),
                    "failed to open configured output device; falling back to default output device"
                );
                open_default_stream(
                    Some(wanted.as_str()),
                    "default-device fallback after named device open failed",
                )
            }
        }
    }

    fn connect_sink(&self) -> Result<Sink, PlaybackError> {
        self.output_stream.get_or_try_init_with(
            || self.open_output_stream(),
            |stream| Sink::connect_new(stream.mixer()),
            || PlaybackError::AudioOutputUnavailable {
                details: "internal error: output stream cache invariant violated".to_owned(),
            },
        )
    }
}

impl Default for RodioAudioContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioContext for RodioAudioContext {
    fn current_time(&self) -> f64 {
        self.created_at.elapsed().as_secs_f64()
    }

    fn start_source(
        &self,
        buffer: &AudioBuffer,
        params: GraphParams,
        offset_secs: f64,
    ) -> Result<Box<dyn SourceHandle>, PlaybackError> {
        let format = buffer.format();
        if buffer.frames() == 0 || format.sample_rate == 0 || format.channels == 0 {
            if self.blank_audio_warn.should_log() {
                tracing::warn!(
                    sample_rate_hz = format.sample_rate,
                    channels = format.channels,
                    samples = buffer.samples().len(),
                    "refusing to play empty/invalid PCM (rate-limited)"
                );
            }
            return Err(PlaybackError::EmptyBuffer);
        }

        let sink = self.connect_sink()?;
        sink.set_volume(params.gain);

        let source = PcmSource::new(buffer.clone(), buffer.sample_index_at(offset_secs));
        let source =
            PitchShift::new(source, params.detune_cents).speed(params.playback_rate as f32);
        sink.append(source);
        sink.play();

        Ok(Box::new(RodioSource { sink }))
    }
}

struct RodioSource {
    sink: Sink,
}

impl SourceHandle for RodioSource {
    fn stop(&mut self) {
        self.sink.stop();
    }
}

fn open_default_stream(wanted: Option<&str>, context: &str) -> Result<OutputStream, PlaybackError> {
    OutputStreamBuilder::open_default_stream().map_err(|e| PlaybackError::AudioOutputUnavailable {
        details: format_stream_error_details(e, wanted, context),
    })
}

#[derive(Debug)]
enum NamedDeviceStreamError {
    DeviceNotFound {
        wanted: String,
        available: Vec<String>,
    },
    OpenFailed {
        wanted: String,
        error: StreamError,
        available: Vec<String>,
    },
}

fn normalize_device_name(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn open_named_output_stream(wanted: &str) -> Result<OutputStream, NamedDeviceStreamError> {
    let wanted_norm = normalize_device_name(wanted);

    let host = rodio::cpal::default_host();
    let mut available: Vec<String> = Vec::new();
    let mut selected = None;

    if let Ok(devices) = host.output_devices() {
        for d in devices {
            let name = d.name().unwrap_or_else(|_| "<unnamed>".to_owned());
            if normalize_device_name(&name) == wanted_norm {
                selected = Some(d);
            }
            available.push(name);
        }
    }

    let Some(device) = selected else {
        return Err(NamedDeviceStreamError::DeviceNotFound {
            wanted: wanted.to_owned(),
            available,
        });
    };

    OutputStreamBuilder::from_device(device)
        .and_then(|b| b.open_stream_or_fallback())
        .map_err(|error| NamedDeviceStreamError::OpenFailed {
            wanted: wanted.to_owned(),
            error,
            available,
        })
}

fn format_device_list(devices: &[String]) -> String {
    if devices.is_empty() {
        return "<unknown>".to_owned();
    }
    devices.join(", ")
}

fn format_stream_error_details(err: StreamError, wanted: Option<&str>, context: &str) -> String {
    let mut s = format!("{context}: {err}");
    if let Some(w) = wanted {
        s.push_str(&format!(" (configured_device={w})"));
    }
    #[cfg(feature = "playback-device-enum")]
    {
        if let Ok(devices) = enumerate_output_device_names() {
            if devices.is_empty() {
                s.push_str("; available_output_devices=<none>");
            } else {
                s.push_str("; available_output_devices=");
                s.push_str(&devices.join(", "));
            }
        }
    }
    s
}

#[cfg(feature = "playback-device-enum")]
pub fn enumerate_output_device_names() -> Result<Vec<String>, PlaybackError> {
    let host = rodio::cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PlaybackError::AudioOutputUnavailable {
            details: format!("failed to list output devices: {e}"),
        })?;

    Ok(devices
        .map(|d| d.name().unwrap_or_else(|_| "<unnamed>".to_owned()))
        .collect())
}

/// Plays an [`AudioBuffer`] from a given interleaved sample index.
struct PcmSource {
    buffer: AudioBuffer,
    pos: usize,
}

impl PcmSource {
    fn new(buffer: AudioBuffer, start: usize) -> Self {
        Self { buffer, pos: start }
    }
}

impl Iterator for PcmSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.buffer.samples().get(self.pos).copied()?;
        self.pos += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.buffer.samples().len().saturating_sub(self.pos);
        (left, Some(left))
    }
}

impl Source for PcmSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.buffer.format().channels
    }

    fn sample_rate(&self) -> u32 {
        self.buffer.format().sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.buffer.duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{decode_pcm16le, PcmFormat};

    #[test]
    fn normalize_device_name_trims_and_is_case_insensitive() {
        assert_eq!(normalize_device_name("  Speakers  "), "speakers");
        assert_eq!(normalize_device_name("HeAdPhOnEs"), "headphones");
    }

    #[test]
    fn format_device_list_handles_empty() {
        assert_eq!(format_device_list(&[]), "<unknown>");
        assert_eq!(
            format_device_list(&["A".to_owned(), "B".to_owned()]),
            "A, B"
        );
    }

    #[test]
    fn blank_audio_warning_is_rate_limited() {
        let limiter = RateLimitedWarn::new(Duration::from_secs(5));
        assert!(limiter.should_log());
        assert!(!limiter.should_log());
    }

    #[test]
    fn pcm_source_starts_at_the_requested_sample() {
        let raw: Vec<u8> = [0i16, 8_192, 16_384, -16_384]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let buffer = decode_pcm16le(&raw, PcmFormat::new(4, 1)).unwrap();
        let source = PcmSource::new(buffer.clone(), buffer.sample_index_at(0.5));
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 4);
        let rest: Vec<f32> = source.collect();
        assert_eq!(rest, vec![0.5, -0.5]);
    }

    #[test]
    fn clock_is_monotonic() {
        let ctx = RodioAudioContext::new();
        let a = ctx.current_time();
        let b = ctx.current_time();
        assert!(b >= a);
    }
}
