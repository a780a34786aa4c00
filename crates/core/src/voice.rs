use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    Male,
    Female,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Language {
    #[serde(rename = "ID")]
    Indonesian,
    #[serde(rename = "EN")]
    English,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::Indonesian => "ID",
            Self::English => "EN",
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct VoiceOption {
    pub id: &'static str,
    pub name: &'static str,
    pub gender: VoiceGender,
    pub language: Language,
    /// Prebuilt voice name understood by the speech backend.
    pub base_voice: &'static str,
    pub description: &'static str,
}

impl fmt::Display for VoiceOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<4} {:<9} {:<6} {} - {}",
            self.id,
            self.name,
            match self.gender {
                VoiceGender::Male => "male",
                VoiceGender::Female => "female",
            },
            self.language.code(),
            self.description
        )
    }
}

pub static VOICES: [VoiceOption; 4] = [
    VoiceOption {
        id: "m-1",
        name: "Pria 1",
        gender: VoiceGender::Male,
        language: Language::Indonesian,
        base_voice: "Charon",
        description: "Suara Dalam & Stabil",
    },
    VoiceOption {
        id: "m-2",
        name: "Pria 2",
        gender: VoiceGender::Male,
        language: Language::English,
        base_voice: "Puck",
        description: "Suara Ceria & Energik",
    },
    VoiceOption {
        id: "f-1",
        name: "Wanita 1",
        gender: VoiceGender::Female,
        language: Language::Indonesian,
        base_voice: "Kore",
        description: "Suara Jelas & Formal",
    },
    VoiceOption {
        id: "f-2",
        name: "Wanita 2",
        gender: VoiceGender::Female,
        language: Language::English,
        base_voice: "Zephyr",
        description: "Suara Lembut & Kasual",
    },
];

pub fn catalog() -> &'static [VoiceOption] {
    &VOICES
}

pub fn default_voice() -> &'static VoiceOption {
    &VOICES[0]
}

pub fn find_voice(id: &str) -> Result<&'static VoiceOption, ConfigError> {
    let wanted = id.trim();
    VOICES
        .iter()
        .find(|v| v.id.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| ConfigError::UnknownVoice(wanted.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_ordered_and_first_is_default() {
        let ids: Vec<_> = catalog().iter().map(|v| v.id).collect();
        assert_eq!(ids, vec!["m-1", "m-2", "f-1", "f-2"]);
        assert_eq!(default_voice().id, crate::config::DEFAULT_VOICE_ID);
    }

    #[test]
    fn find_voice_is_case_insensitive() {
        assert_eq!(find_voice(" F-1 ").unwrap().base_voice, "Kore");
    }

    #[test]
    fn unknown_voice_is_reported() {
        assert_eq!(
            find_voice("x-9").unwrap_err(),
            ConfigError::UnknownVoice("x-9".to_owned())
        );
    }
}
