//! Changepoint detection
//!
//! Per-stream Bayesian online changepoint detection. Each stream gets its
//! own [`ChangepointProcessor`] holding a bounded mixture of run-length
//! hypotheses; hysteresis counters suppress lonely outliers and a severity
//! gate rate-limits event emission.

pub mod changepoint;
pub mod run;
pub mod severity;

pub use changepoint::{ChangepointProcessor, ProcessorState};
pub use run::{Run, RunSet, GROWTH_FACTOR, HAZARD_PRIOR};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};

/// Changepoint detector tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangepointConfig {
    /// Maximum run hypotheses retained per stream
    pub max_history: usize,
    /// Consecutive anomalies before emission is considered
    pub trigger_count: u32,
    /// Consecutive normals that cancel a recent outlier
    pub ignore_outlier_after: u32,
    /// Idle gap in seconds after which per-stream state resets
    pub inactivity_purge_sec: u32,
    /// Minimum spacing between emitted events, in seconds
    pub min_event_interval_sec: u32,
    /// Minimum severity an event must exceed to be emitted
    pub severity_threshold: u8,
}

impl Default for ChangepointConfig {
    fn default() -> Self {
        Self {
            max_history: 20,
            trigger_count: 10,
            ignore_outlier_after: 1,
            inactivity_purge_sec: 60,
            min_event_interval_sec: 10,
            severity_threshold: 30,
        }
    }
}

impl ChangepointConfig {
    pub fn inactivity_purge(&self) -> Duration {
        Duration::seconds(i64::from(self.inactivity_purge_sec))
    }

    pub fn min_event_interval(&self) -> Duration {
        Duration::seconds(i64::from(self.min_event_interval_sec))
    }

    /// Reject out-of-range settings; construction aborts on failure
    pub fn validate(&self) -> Result<()> {
        if self.max_history < 2 {
            return Err(DetectError::Config(
                "detector.changepoint.maxHistory must be at least 2".to_string(),
            ));
        }
        if self.trigger_count == 0 {
            return Err(DetectError::Config(
                "detector.changepoint.triggerCount must be positive".to_string(),
            ));
        }
        if self.inactivity_purge_sec == 0 {
            return Err(DetectError::Config(
                "detector.changepoint.inactivityPurgeSec must be positive".to_string(),
            ));
        }
        if self.severity_threshold > 100 {
            return Err(DetectError::Config(
                "detector.changepoint.severityThreshold must be within 0..=100".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = ChangepointConfig::default();
        assert_eq!(cfg.max_history, 20);
        assert_eq!(cfg.trigger_count, 10);
        assert_eq!(cfg.ignore_outlier_after, 1);
        assert_eq!(cfg.inactivity_purge_sec, 60);
        assert_eq!(cfg.min_event_interval_sec, 10);
        assert_eq!(cfg.severity_threshold, 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_degenerate_history() {
        let cfg = ChangepointConfig {
            max_history: 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_camel_case_keys() {
        let cfg: ChangepointConfig =
            toml::from_str("maxHistory = 40\ntriggerCount = 5").unwrap();
        assert_eq!(cfg.max_history, 40);
        assert_eq!(cfg.trigger_count, 5);
        // unset keys fall back to defaults
        assert_eq!(cfg.severity_threshold, 30);
    }
}
