use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const MIN_UI_SPEED: f64 = 1.0;
pub const MAX_UI_SPEED: f64 = 2.0;
pub const SPEED_STEP: f64 = 0.1;
/// Fraction of the UI speed range that reaches the source's playback rate.
const SPEED_COMPRESSION: f64 = 0.4;
const PITCH_SHIFT_CENTS: f32 = 350.0;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Pitch {
    Low,
    #[default]
    Normal,
    High,
}

impl Pitch {
    /// Detune in cents (1200 per octave).
    pub fn detune_cents(self) -> f32 {
        match self {
            Self::Low => -PITCH_SHIFT_CENTS,
            Self::Normal => 0.0,
            Self::High => PITCH_SHIFT_CENTS,
        }
    }
}

impl FromStr for Pitch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            _ => Err(ConfigError::UnknownPitch(s.to_owned())),
        }
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        })
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SpeechSettings {
    /// UI-facing multiplier in `[1.0, 2.0]`.
    pub speed: f64,
    pub pitch: Pitch,
    /// Linear gain in `[0.0, 1.0]`.
    pub volume: f32,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            speed: MIN_UI_SPEED,
            pitch: Pitch::Normal,
            volume: 1.0,
        }
    }
}

impl SpeechSettings {
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = snap_ui_speed(speed);
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = clamp_volume(volume);
        self
    }

    pub fn playback_rate(&self) -> f64 {
        map_ui_speed_to_rate(self.speed)
    }
}

/// Maps the UI speed range `[1.0, 2.0]` onto playback rates `[1.0, 1.4]`.
pub fn map_ui_speed_to_rate(ui_speed: f64) -> f64 {
    let clamped = ui_speed.clamp(MIN_UI_SPEED, MAX_UI_SPEED);
    1.0 + (clamped - MIN_UI_SPEED) * SPEED_COMPRESSION
}

/// Clamps to the slider range and snaps to its 0.1 grid.
pub fn snap_ui_speed(ui_speed: f64) -> f64 {
    if !ui_speed.is_finite() {
        return MIN_UI_SPEED;
    }
    let steps = ((ui_speed - MIN_UI_SPEED) / SPEED_STEP).round();
    (MIN_UI_SPEED + steps * SPEED_STEP).clamp(MIN_UI_SPEED, MAX_UI_SPEED)
}

pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 1.0;
    }
    volume.clamp(0.0, 1.0)
}
