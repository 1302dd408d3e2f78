//! Measurement input type
//!
//! Immutable value objects produced by ingestion sources and consumed by the
//! per-stream detectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of telemetry a measurement carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    /// Round-trip latency in milliseconds
    Latency,
    /// Packet loss ratio
    Loss,
    /// Hop count of the measured path
    PathLength,
    /// Flow volume
    Flow,
}

impl MeasurementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementKind::Latency => "latency",
            MeasurementKind::Loss => "loss",
            MeasurementKind::PathLength => "path_length",
            MeasurementKind::Flow => "flow",
        }
    }
}

impl std::fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single telemetry observation for one stream
///
/// A stream is a unique scheduled network test; its identifier partitions all
/// input. Measurements flagged `lossy` or missing a value never reach a
/// detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Stream (partition key) this observation belongs to
    pub stream_id: String,
    /// Event time of the observation
    pub time: DateTime<Utc>,
    /// The scalar the detector observes, e.g. RTT in ms
    pub default_value: Option<f64>,
    /// Set when the test lost its probe; such measurements are dropped
    #[serde(default)]
    pub lossy: bool,
    /// Kind of telemetry
    pub kind: MeasurementKind,
}

impl Measurement {
    /// Create a latency measurement with a value
    pub fn new(stream_id: impl Into<String>, time: DateTime<Utc>, value: f64) -> Self {
        Self {
            stream_id: stream_id.into(),
            time,
            default_value: Some(value),
            lossy: false,
            kind: MeasurementKind::Latency,
        }
    }

    /// Set the measurement kind
    pub fn with_kind(mut self, kind: MeasurementKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark the measurement as lossy
    pub fn with_lossy(mut self, lossy: bool) -> Self {
        self.lossy = lossy;
        self
    }

    /// Whether a detector may observe this measurement
    pub fn observable(&self) -> bool {
        !self.lossy && self.default_value.is_some()
    }
}
