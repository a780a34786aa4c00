use crate::config::{ApiKey, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::decode::PcmFormat;
use crate::tts::{TtsAudio, TtsClient, TtsError, TtsRequest};
use crate::util::{retry_with_backoff, RetryConfig};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "tts::gemini";

/// Text-to-speech through the Gemini `generateContent` REST endpoint with an
/// audio-only response modality.
#[derive(Clone)]
pub struct GeminiTtsClient {
    client: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl GeminiTtsClient {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn send_once(&self, body: &GenerateContentRequest) -> Result<GenerateContentResponse, TtsError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_owned());
            return Err(TtsError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| TtsError::InvalidPayload(format!("failed to parse response JSON: {e}")))
    }
}

fn build_prompt(text: &str) -> String {
    format!("Read naturally (ID/EN mix): \"{text}\"")
}

fn build_request_body(request: &TtsRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![RequestContent {
            parts: vec![TextPart {
                text: build_prompt(&request.text),
            }],
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["AUDIO"],
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: request.voice.0.clone(),
                    },
                },
            },
        },
    }
}

/// Sample rate from a mime type such as `audio/L16;codec=pcm;rate=24000`.
fn sample_rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
}

fn extract_audio(response: GenerateContentResponse) -> Result<TtsAudio, TtsError> {
    let inline = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|content| content.parts.into_iter().find_map(|p| p.inline_data))
        .ok_or(TtsError::MissingAudio)?;

    let pcm = STANDARD
        .decode(inline.data.trim())
        .map_err(|e| TtsError::InvalidPayload(format!("audio is not valid base64: {e}")))?;
    if pcm.is_empty() {
        return Err(TtsError::MissingAudio);
    }

    let mut format = PcmFormat::tts_mono_24khz();
    if let Some(rate) = inline.mime_type.as_deref().and_then(sample_rate_from_mime) {
        format.sample_rate = rate;
    }

    Ok(TtsAudio {
        format,
        pcm: Bytes::from(pcm),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    speech_config: SpeechConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

impl TtsClient for GeminiTtsClient {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        let this = self.clone();
        async move {
            let body = build_request_body(&request);
            tracing::debug!(
                target: LOG_TARGET,
                model = %this.model,
                voice = %request.voice.0,
                chars = request.text.chars().count(),
                "requesting speech"
            );

            let response = retry_with_backoff(
                &this.retry,
                || this.send_once(&body),
                TtsError::is_retryable,
            )
            .await?;

            let audio = extract_audio(response)?;
            tracing::debug!(
                target: LOG_TARGET,
                bytes = audio.pcm.len(),
                sample_rate = audio.format.sample_rate,
                "speech received"
            );
            Ok(audio)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::VoiceId;

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn request_body_matches_gemini_schema() {
        let body = build_request_body(&TtsRequest {
            text: "Halo semua".to_owned(),
            voice: VoiceId("Charon".to_owned()),
        });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [{"parts": [{"text": "Read naturally (ID/EN mix): \"Halo semua\""}]}],
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Charon"}}
                    }
                }
            })
        );
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = GeminiTtsClient::new(ApiKey::new("k").unwrap())
            .with_base_url("http://localhost:8080/v1beta/".to_owned())
            .with_model("tts-model".to_owned());
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/v1beta/models/tts-model:generateContent"
        );
    }

    #[test]
    fn inline_audio_is_decoded() {
        let data = STANDARD.encode([1u8, 0, 2, 0]);
        let resp = parse(&format!(
            r#"{{"candidates":[{{"content":{{"parts":[{{"inlineData":{{"mimeType":"audio/L16;codec=pcm;rate=24000","data":"{data}"}}}}]}}}}]}}"#
        ));
        let audio = extract_audio(resp).unwrap();
        assert_eq!(&audio.pcm[..], &[1u8, 0, 2, 0]);
        assert_eq!(audio.format, PcmFormat::tts_mono_24khz());
    }

    #[test]
    fn mime_rate_overrides_default() {
        let data = STANDARD.encode([0u8; 4]);
        let resp = parse(&format!(
            r#"{{"candidates":[{{"content":{{"parts":[{{"text":"hi"}},{{"inlineData":{{"mimeType":"audio/L16; rate=16000","data":"{data}"}}}}]}}}}]}}"#
        ));
        assert_eq!(extract_audio(resp).unwrap().format.sample_rate, 16_000);
    }

    #[test]
    fn missing_audio_is_reported() {
        assert!(matches!(
            extract_audio(parse(r#"{"candidates":[]}"#)),
            Err(TtsError::MissingAudio)
        ));
        assert!(matches!(
            extract_audio(parse(r#"{"candidates":[{"content":{"parts":[{"text":"no"}]}}]}"#)),
            Err(TtsError::MissingAudio)
        ));
        assert!(matches!(extract_audio(parse("{}")), Err(TtsError::MissingAudio)));
    }

    #[test]
    fn bad_base64_is_invalid_payload() {
        let resp = parse(r#"{"candidates":[{"content":{"parts":[{"inlineData":{"data":"!!!"}}]}}]}"#);
        assert!(matches!(extract_audio(resp), Err(TtsError::InvalidPayload(_))));
    }

    #[test]
    fn sample_rate_parsing() {
        assert_eq!(sample_rate_from_mime("audio/L16;codec=pcm;rate=24000"), Some(24_000));
        assert_eq!(sample_rate_from_mime("audio/L16"), None);
        assert_eq!(sample_rate_from_mime("audio/L16;rate=abc"), None);
    }
}
