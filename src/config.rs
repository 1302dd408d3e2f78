//! Configuration
//!
//! TOML-backed configuration with the documented defaults baked into the
//! `Default` impls. Key names follow the flat dotted scheme consumed by the
//! detectors, e.g. `detector.changepoint.maxHistory`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::detect::ChangepointConfig;
use crate::group::GrouperConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub event_grouping: EventGroupingConfig,
    pub pipeline: PipelineConfig,
}

/// Detector section; one table per detector family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    pub changepoint: ChangepointConfig,
}

/// Event grouping section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventGroupingConfig {
    pub time: GrouperConfig,
}

/// Keyed dataflow tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// How far behind the per-stream watermark a measurement may arrive
    pub allowed_lateness_sec: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allowed_lateness_sec: 5,
        }
    }
}

impl PipelineConfig {
    pub fn allowed_lateness(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.allowed_lateness_sec))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load config from default locations or fall back to defaults
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/netdrift/config.toml"),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Reject out-of-range settings before anything is constructed
    pub fn validate(&self) -> Result<()> {
        self.detector.changepoint.validate()?;
        self.event_grouping.time.validate()?;
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detector.changepoint.max_history, 20);
        assert_eq!(config.event_grouping.time.maximum_event_length, 60);
        assert_eq!(config.pipeline.allowed_lateness_sec, 5);
    }

    #[test]
    fn test_dotted_keys_parse() {
        let toml_str = r#"
            [detector.changepoint]
            maxHistory = 40
            triggerCount = 5
            severityThreshold = 50

            [eventGrouping.time]
            maximumEventLength = 120
            maximumEventInterval = 15

            [pipeline]
            allowedLatenessSec = 0
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.detector.changepoint.max_history, 40);
        assert_eq!(config.detector.changepoint.trigger_count, 5);
        assert_eq!(config.detector.changepoint.severity_threshold, 50);
        assert_eq!(config.event_grouping.time.maximum_event_length, 120);
        assert_eq!(config.event_grouping.time.maximum_event_interval, 15);
        assert_eq!(config.pipeline.allowed_lateness_sec, 0);
        // untouched keys keep their defaults
        assert_eq!(config.detector.changepoint.ignore_outlier_after, 1);
    }

    #[test]
    fn test_validation_fails_on_bad_values() {
        let toml_str = r#"
            [detector.changepoint]
            inactivityPurgeSec = 0
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
