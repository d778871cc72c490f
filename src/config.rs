// config.rs

use crate::error::{Error, Result};
use crate::genre::GenrePreset;
use log::{debug, info};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const BEATS_PER_BAR: u64 = 4;
pub const DEFAULT_TEMPO: f64 = 120.0;
pub const DEFAULT_GENRE: &str = "chill";

pub const DEFAULT_PERFECT_MS: f64 = 50.0;
pub const DEFAULT_GOOD_MS: f64 = 150.0;

pub const DEFAULT_LOOKAHEAD_MS: f64 = 100.0;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 25;

pub const DEFAULT_DEBOUNCE_MS: f64 = 100.0;
pub const DEFAULT_VOICES: u8 = 4;

const ENV_PREFIX: &str = "BEATSYNC";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub perfect_ms: f64,
    pub good_ms: f64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            perfect_ms: DEFAULT_PERFECT_MS,
            good_ms: DEFAULT_GOOD_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub lookahead_ms: f64,
    pub poll_interval_ms: u64,
}

impl SchedulerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            lookahead_ms: DEFAULT_LOOKAHEAD_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Minimum time between two triggers of the same logical input.
    pub debounce_ms: f64,
    /// Number of logical inputs, one voice channel each.
    pub voices: u8,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            voices: DEFAULT_VOICES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub genre: String,
    /// Overrides the selected preset's tempo when set.
    pub tempo: Option<f64>,
    pub timing: TimingSettings,
    pub scheduler: SchedulerSettings,
    pub input: InputSettings,
    /// Extra presets, looked up before the built-in ones.
    pub presets: Vec<GenrePreset>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            genre: DEFAULT_GENRE.to_string(),
            tempo: None,
            timing: TimingSettings::default(),
            scheduler: SchedulerSettings::default(),
            input: InputSettings::default(),
            presets: Vec::new(),
        }
    }
}

impl Settings {
    /// Layers an optional settings file and `BEATSYNC_*` environment
    /// variables over the defaults, then validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!("Loading settings from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        debug!("Loaded settings: {:?}", settings);
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(tempo) = self.tempo {
            if !tempo.is_finite() || tempo <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "tempo must be positive, got {}",
                    tempo
                )));
            }
        }

        let timing = &self.timing;
        if timing.perfect_ms < 0.0 || timing.perfect_ms > timing.good_ms {
            return Err(Error::InvalidConfig(format!(
                "accuracy thresholds must satisfy 0 <= perfect ({}) <= good ({})",
                timing.perfect_ms, timing.good_ms
            )));
        }

        let scheduler = &self.scheduler;
        if scheduler.poll_interval_ms == 0
            || scheduler.poll_interval_ms as f64 >= scheduler.lookahead_ms
        {
            return Err(Error::InvalidConfig(format!(
                "poll interval ({} ms) must be non-zero and shorter than the lookahead ({} ms)",
                scheduler.poll_interval_ms, scheduler.lookahead_ms
            )));
        }

        if self.input.voices == 0 {
            return Err(Error::InvalidConfig(
                "at least one input voice is required".to_string(),
            ));
        }

        if self.input.debounce_ms < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "debounce interval must not be negative, got {}",
                self.input.debounce_ms
            )));
        }

        for preset in &self.presets {
            preset.validate()?;
        }

        Ok(())
    }

    /// Resolves the configured genre, custom presets first.
    pub fn preset(&self) -> Result<GenrePreset> {
        let mut preset = GenrePreset::find(&self.genre, &self.presets)
            .ok_or_else(|| Error::UnknownGenre(self.genre.clone()))?;
        if let Some(tempo) = self.tempo {
            preset.tempo = tempo;
        }
        Ok(preset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.scheduler.poll_interval(), Duration::from_millis(25));
    }

    #[test]
    fn test_poll_interval_must_be_shorter_than_lookahead() {
        let mut settings = Settings::default();
        settings.scheduler.poll_interval_ms = 100;
        assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_thresholds_must_be_ordered() {
        let mut settings = Settings::default();
        settings.timing.perfect_ms = 200.0;
        assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_tempo_override_applies_to_preset() {
        let settings = Settings {
            genre: "house".to_string(),
            tempo: Some(122.0),
            ..Settings::default()
        };
        assert_eq!(settings.preset().unwrap().tempo, 122.0);
    }

    #[test]
    fn test_unknown_genre_is_reported() {
        let settings = Settings {
            genre: "polka".to_string(),
            ..Settings::default()
        };
        assert!(matches!(settings.preset(), Err(Error::UnknownGenre(name)) if name == "polka"));
    }
}
