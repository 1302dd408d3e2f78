//! netdrift - streaming network-telemetry anomaly detection
//!
//! Measurements (latency, loss, path length, flow) arrive keyed per stream;
//! each stream is analyzed independently by a Bayesian online changepoint
//! detector and its events are coalesced into incident groups.
//!
//! # Example
//! ```
//! use chrono::{TimeZone, Utc};
//! use netdrift::config::Config;
//! use netdrift::measurement::Measurement;
//! use netdrift::pipeline::Pipeline;
//!
//! let mut pipeline = Pipeline::new(Config::default());
//! let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
//! let m = Measurement::new("probe-1", t, 51.7);
//! let groups = pipeline.process(&m).unwrap();
//! assert!(groups.is_empty());
//! ```

pub mod config;
pub mod detect;
pub mod error;
pub mod event;
pub mod group;
pub mod measurement;
pub mod pipeline;
pub mod stats;

pub use config::Config;
pub use detect::{ChangepointConfig, ChangepointProcessor};
pub use error::{DetectError, Result};
pub use event::{ChangepointEvent, EventGroup};
pub use group::{GrouperConfig, TemporalEventGrouper};
pub use measurement::{Measurement, MeasurementKind};
pub use pipeline::Pipeline;
pub use stats::{Distribution, NormalDistribution};
