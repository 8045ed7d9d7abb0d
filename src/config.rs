//! Feature engine configuration
//!
//! Every window size, threshold and boundary used by the feature builders lives
//! here so that a run can be reproduced from a saved config file. Configs load
//! from JSON or TOML, chosen by file extension.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Trailing calendar-day window with a minimum observation count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingWindow {
    pub days: u32,
    pub min_periods: u32,
}

impl RollingWindow {
    pub const fn new(days: u32, min_periods: u32) -> Self {
        Self { days, min_periods }
    }

    fn validate(&self, name: &str) -> Result<(), ComputeError> {
        if self.days == 0 {
            return Err(ComputeError::ConfigError(format!(
                "{name}: window must span at least one day"
            )));
        }
        if self.min_periods == 0 || self.min_periods > self.days {
            return Err(ComputeError::ConfigError(format!(
                "{name}: min_periods must be in 1..={}, got {}",
                self.days, self.min_periods
            )));
        }
        Ok(())
    }
}

/// Slot layout of the per-day 5-minute intensity sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityWindowConfig {
    /// Number of slots in one day (24h at 5-minute resolution)
    pub slots_per_day: usize,
    /// Slots counted after waking and before bedtime
    pub exercise_window_slots: usize,
    pub noon_start_slot: usize,
    pub noon_window_slots: usize,
    pub evening_start_slot: usize,
    pub evening_window_slots: usize,
    /// Lowest intensity code counted as medium/high
    pub intensity_threshold: u8,
    /// Bedtimes starting in `[0, early_bedtime_hour)` count as after midnight
    pub early_bedtime_hour: u32,
}

impl Default for ActivityWindowConfig {
    fn default() -> Self {
        Self {
            slots_per_day: 288,
            exercise_window_slots: 36,
            noon_start_slot: 96,
            noon_window_slots: 24,
            evening_start_slot: 156,
            evening_window_slots: 24,
            intensity_threshold: 3,
            early_bedtime_hour: 6,
        }
    }
}

/// Configuration of the per-user feature derivation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Sleep scores up to this value are "fair"
    pub fair_sleep_max: f64,
    /// Sleep scores up to this value are "good", above are "great"
    pub good_sleep_max: f64,
    /// Forecast horizon for the next-week sleep score target
    pub target_lead_days: u32,
    pub period_offset_days: u32,
    /// Relative change reported when the prior period value is zero
    pub zero_prior_cap: f64,
    pub short_window: RollingWindow,
    pub medium_window: RollingWindow,
    pub long_window: RollingWindow,
    /// Window for the mean/std pair feeding deviation buckets
    pub deviation_window: RollingWindow,
    pub activity: ActivityWindowConfig,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fair_sleep_max: 75.0,
            good_sleep_max: 85.0,
            target_lead_days: 7,
            period_offset_days: 7,
            zero_prior_cap: 1.0,
            short_window: RollingWindow::new(7, 3),
            medium_window: RollingWindow::new(14, 10),
            long_window: RollingWindow::new(21, 17),
            deviation_window: RollingWindow::new(21, 10),
            activity: ActivityWindowConfig::default(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        self.short_window.validate("short_window")?;
        self.medium_window.validate("medium_window")?;
        self.long_window.validate("long_window")?;
        self.deviation_window.validate("deviation_window")?;

        if !(0.0 < self.fair_sleep_max && self.fair_sleep_max < self.good_sleep_max) {
            return Err(ComputeError::ConfigError(format!(
                "sleep score boundaries must increase: fair {} / good {}",
                self.fair_sleep_max, self.good_sleep_max
            )));
        }

        let a = &self.activity;
        if a.slots_per_day == 0 || a.exercise_window_slots == 0 {
            return Err(ComputeError::ConfigError(
                "activity slot windows must be non-empty".to_string(),
            ));
        }
        if a.noon_start_slot + a.noon_window_slots > a.slots_per_day
            || a.evening_start_slot + a.evening_window_slots > a.slots_per_day
        {
            return Err(ComputeError::ConfigError(
                "fixed activity windows must fit inside one day".to_string(),
            ));
        }
        if a.early_bedtime_hour > 24 {
            return Err(ComputeError::ConfigError(format!(
                "early_bedtime_hour out of range: {}",
                a.early_bedtime_hour
            )));
        }
        if self.period_offset_days == 0 {
            return Err(ComputeError::ConfigError(
                "period_offset_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Engine-level configuration: feature settings plus execution strategy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Build users on a worker pool instead of the calling thread
    pub parallel: bool,
    /// Worker count for parallel runs (defaults to the number of CPUs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<usize>,
    pub features: FeatureConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.num_threads == Some(0) {
            return Err(ComputeError::ConfigError(
                "num_threads must be positive".to_string(),
            ));
        }
        self.features.validate()
    }

    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_toml(text: &str) -> Result<Self, ComputeError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ComputeError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ComputeError> {
        toml::to_string_pretty(self).map_err(|e| ComputeError::ConfigError(e.to_string()))
    }

    /// Load a config file; `.toml` files are parsed as TOML, anything else as JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ComputeError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&text),
            _ => Self::from_json(&text),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ComputeError> {
        let path = path.as_ref();
        let text = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => self.to_toml()?,
            _ => self.to_json()?,
        };
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.features.short_window, RollingWindow::new(7, 3));
        assert_eq!(config.features.deviation_window, RollingWindow::new(21, 10));
        assert!(!config.parallel);
    }

    #[test]
    fn test_json_round_trip_keeps_windows() {
        let mut config = EngineConfig::default();
        config.features.long_window = RollingWindow::new(28, 20);
        config.parallel = true;

        let json = config.to_json().unwrap();
        let loaded = EngineConfig::from_json(&json).unwrap();
        assert_eq!(loaded.features.long_window, RollingWindow::new(28, 20));
        assert!(loaded.parallel);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let loaded = EngineConfig::from_json(r#"{"parallel": true}"#).unwrap();
        assert!(loaded.parallel);
        assert_eq!(loaded.features.activity.slots_per_day, 288);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let text = config.to_toml().unwrap();
        let loaded = EngineConfig::from_toml(&text).unwrap();
        assert_eq!(loaded.features.medium_window, RollingWindow::new(14, 10));
    }

    #[test]
    fn test_rejects_min_periods_above_window() {
        let mut config = EngineConfig::default();
        config.features.short_window = RollingWindow::new(7, 8);
        assert!(matches!(
            config.validate(),
            Err(ComputeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_rejects_inverted_score_boundaries() {
        let mut config = EngineConfig::default();
        config.features.fair_sleep_max = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_threads() {
        let config = EngineConfig {
            num_threads: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
