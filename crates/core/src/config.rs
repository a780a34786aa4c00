use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

pub const PRODUCT_NAME: &str = "swara";
pub const MAX_CHARS: usize = 1000;
pub const TTS_SAMPLE_RATE_HZ: u32 = 24_000;
pub const TTS_CHANNELS: u16 = 1;
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_VOICE_ID: &str = "m-1";
pub const DEFAULT_TEXT: &str =
    "Halo everyone! Selamat datang di SWARA. Pilih pembicara favorit Anda dan sesuaikan nadanya.";
pub const GENERATION_FAILED_MESSAGE: &str =
    "Failed to process audio. Check your internet connection.";

pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_SWARA_MODEL: &str = "SWARA_MODEL";
pub const ENV_SWARA_BASE_URL: &str = "SWARA_BASE_URL";
pub const ENV_SWARA_OUTPUT_DEVICE: &str = "SWARA_OUTPUT_DEVICE";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TtsBackendConfig {
    pub api_key: Option<ApiKey>,
    pub model: String,
    pub base_url: String,
}

impl Default for TtsBackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Output device name, matched case-insensitively. `None` uses the default device.
    pub output_device: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub tts: TtsBackendConfig,
    pub playback: PlaybackConfig,
    pub voice_id: String,
    pub export_dir: Option<PathBuf>,
    pub offline: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tts: TtsBackendConfig::default(),
            playback: PlaybackConfig::default(),
            voice_id: DEFAULT_VOICE_ID.to_owned(),
            export_dir: None,
            offline: false,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("unknown voice id: {0}")]
    UnknownVoice(String),
    #[error("unknown pitch {0:?} (expected low, normal or high)")]
    UnknownPitch(String),
    #[error("{name} must be a number, got {value:?}")]
    NotANumber { name: &'static str, value: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Resolves an API key from the CLI value, then each env key in order.
pub fn resolve_api_key(
    cli_value: Option<String>,
    env_keys: &[&str],
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    if let Some(v) = cli_value {
        return Ok(Some(ApiKey::new(v)?));
    }
    for key in env_keys {
        if let Some(v) = env.var(key) {
            return Ok(Some(ApiKey::new(v)?));
        }
    }
    Ok(None)
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}
