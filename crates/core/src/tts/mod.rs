mod gemini;
mod tone;

use crate::decode::PcmFormat;
use crate::util::is_http_retryable;
use crate::voice::VoiceOption;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use gemini::GeminiTtsClient;
pub use tone::ToneTtsClient;

/// Prebuilt voice name on the speech backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceId(pub String);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TtsRequest {
    pub text: String,
    pub voice: VoiceId,
}

impl TtsRequest {
    pub fn for_voice(text: impl Into<String>, voice: &VoiceOption) -> Self {
        Self {
            text: text.into(),
            voice: VoiceId(voice.base_voice.to_owned()),
        }
    }
}

/// Raw little-endian 16-bit PCM plus the layout it was produced with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TtsAudio {
    pub format: PcmFormat,
    pub pcm: Bytes,
}

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("speech backend returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("speech backend response carried no audio")]
    MissingAudio,

    #[error("invalid audio payload: {0}")]
    InvalidPayload(String),
}

impl TtsError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => is_http_retryable(*status),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub trait TtsClient: Send + Sync {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>>;
}

impl<T: TtsClient + ?Sized> TtsClient for Arc<T> {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        (**self).synthesize(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::find_voice;

    #[test]
    fn request_uses_backend_voice_name() {
        let req = TtsRequest::for_voice("Hello", find_voice("f-2").unwrap());
        assert_eq!(req.voice, VoiceId("Zephyr".to_owned()));
        assert_eq!(req.text, "Hello");
    }

    #[test]
    fn only_transient_api_statuses_are_retryable() {
        let busy = TtsError::Api {
            status: 503,
            body: String::new(),
        };
        let bad = TtsError::Api {
            status: 400,
            body: String::new(),
        };
        assert!(busy.is_retryable());
        assert!(!bad.is_retryable());
        assert!(!TtsError::MissingAudio.is_retryable());
    }
}
