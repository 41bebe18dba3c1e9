use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Scheduling compensation used by Chromium based hosts.
pub const CHROMIUM_AUDIO_DELAY: f64 = 0.001;
/// Scheduling compensation used everywhere else.
pub const DEFAULT_AUDIO_DELAY: f64 = 0.03;
/// Voice budget used when nothing (valid) has been persisted.
pub const DEFAULT_MAX_POLYPHONY: usize = 6;
/// Initial linear gain of the output stage.
pub const DEFAULT_MAIN_VOLUME: f32 = 0.175;

/// Latency preference passed to the platform when a context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyHint {
    #[default]
    Interactive,
    Balanced,
    Playback,
}

/// Top-level configuration for a synth session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub latency_hint: LatencyHint,
    /// Seconds added to every voice trigger so events are not scheduled in
    /// the past. Depends on the host, not on the user.
    pub audio_delay: f64,
    pub main_volume: f32,
    pub default_max_polyphony: usize,
    pub filters: FilterConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            latency_hint: LatencyHint::Interactive,
            audio_delay: DEFAULT_AUDIO_DELAY,
            main_volume: DEFAULT_MAIN_VOLUME,
            default_max_polyphony: DEFAULT_MAX_POLYPHONY,
            filters: FilterConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Defaults with the audio delay picked for the given host user agent.
    pub fn for_user_agent(user_agent: &str) -> Self {
        Self {
            audio_delay: audio_delay_for(user_agent),
            ..Self::default()
        }
    }

    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Protective filters placed in front of the output gain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub lowpass_hz: f32,
    pub highpass_hz: f32,
    pub q: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            lowpass_hz: 5000.0,
            highpass_hz: 30.0,
            q: std::f32::consts::FRAC_1_SQRT_2,
        }
    }
}

fn audio_delay_for(user_agent: &str) -> f64 {
    if user_agent.contains("Chrome") || user_agent.contains("Chromium") {
        CHROMIUM_AUDIO_DELAY
    } else {
        DEFAULT_AUDIO_DELAY
    }
}
