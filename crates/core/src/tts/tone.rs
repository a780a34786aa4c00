use crate::decode::PcmFormat;
use crate::tts::{TtsAudio, TtsClient, TtsError, TtsRequest};
use bytes::{BufMut, BytesMut};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::f32::consts::PI;

const MS_PER_CHAR: usize = 60;
const MIN_DURATION_MS: usize = 500;
const FADE_MS: usize = 10;
const AMPLITUDE: f32 = 0.3;

/// Offline stand-in for the speech backend: a sine tone whose length follows
/// the text and whose frequency follows the voice name.
#[derive(Clone, Debug)]
pub struct ToneTtsClient {
    format: PcmFormat,
}

impl ToneTtsClient {
    pub fn new() -> Self {
        Self {
            format: PcmFormat::tts_mono_24khz(),
        }
    }

    pub fn with_format(format: PcmFormat) -> Self {
        Self { format }
    }

    fn frequency_for(voice: &str) -> f32 {
        let sum: u32 = voice.bytes().map(u32::from).sum();
        150.0 + (sum % 150) as f32
    }

    fn render(&self, request: &TtsRequest) -> BytesMut {
        let chars = request.text.chars().count();
        let duration_ms = (chars * MS_PER_CHAR).max(MIN_DURATION_MS);
        let rate = self.format.sample_rate as usize;
        let frames = duration_ms * rate / 1000;
        let fade = (FADE_MS * rate / 1000).max(1);
        let freq = Self::frequency_for(&request.voice.0);

        let mut out = BytesMut::with_capacity(frames * self.format.frame_bytes());
        for i in 0..frames {
            let t = i as f32 / rate as f32;
            let envelope = (i.min(frames - 1 - i) as f32 / fade as f32).min(1.0);
            let sample = ((2.0 * PI * freq * t).sin() * AMPLITUDE * envelope * i16::MAX as f32) as i16;
            for _ in 0..self.format.channels {
                out.put_i16_le(sample);
            }
        }
        out
    }
}

impl Default for ToneTtsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TtsClient for ToneTtsClient {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        async move {
            let pcm = self.render(&request).freeze();
            tracing::debug!(voice = %request.voice.0, bytes = pcm.len(), "rendered offline tone");
            Ok(TtsAudio {
                format: self.format,
                pcm,
            })
        }
        .boxed()
    }
}
