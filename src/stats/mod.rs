//! Continuous probability models
//!
//! The changepoint detector is polymorphic over a small capability set:
//! incremental update, density queries, and summary statistics. Distributions
//! are a tagged variant so run state stays plainly serializable.

pub mod normal;

pub use normal::NormalDistribution;

use serde::{Deserialize, Serialize};

use crate::measurement::Measurement;

/// A continuous distribution usable as a run hypothesis model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum Distribution {
    Normal(NormalDistribution),
}

impl Distribution {
    /// A new distribution incorporating `m` as its `new_n`-th observation
    ///
    /// `new_n == 1` starts a fresh hypothesis from this point.
    pub fn with_point(&self, m: &Measurement, new_n: u32) -> Distribution {
        self.with_value(self.map(m), new_n)
    }

    /// Scalar form of [`Distribution::with_point`]
    pub fn with_value(&self, x: f64, new_n: u32) -> Distribution {
        match self {
            Distribution::Normal(d) => Distribution::Normal(d.with_value(x, new_n)),
        }
    }

    /// Density at the measurement's scalar projection
    pub fn pdf(&self, m: &Measurement) -> f64 {
        self.pdf_at(self.map(m))
    }

    /// Density at `x`, always non-negative
    pub fn pdf_at(&self, x: f64) -> f64 {
        match self {
            Distribution::Normal(d) => d.pdf(x),
        }
    }

    /// Scalar projection the distribution models
    ///
    /// Measurements without a value are filtered before they reach a
    /// detector; the NaN here poisons the probability mass and forces a
    /// detector reset if one slips through.
    pub fn map(&self, m: &Measurement) -> f64 {
        m.default_value.unwrap_or(f64::NAN)
    }

    pub fn mean(&self) -> f64 {
        match self {
            Distribution::Normal(d) => d.mean,
        }
    }

    pub fn variance(&self) -> f64 {
        match self {
            Distribution::Normal(d) => d.variance(),
        }
    }

    pub fn n(&self) -> u32 {
        match self {
            Distribution::Normal(d) => d.n,
        }
    }
}

impl Default for Distribution {
    fn default() -> Self {
        Distribution::Normal(NormalDistribution::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_with_point_uses_measurement_value() {
        let t = Utc.timestamp_opt(0, 0).unwrap();
        let m = Measurement::new("s1", t, 42.0);
        let d = Distribution::default().with_point(&m, 1);
        assert_eq!(d.mean(), 42.0);
        assert_eq!(d.n(), 1);
    }

    #[test]
    fn test_serde_roundtrip() {
        let d = Distribution::default().with_value(10.0, 1).with_value(12.0, 2);
        let json = serde_json::to_string(&d).unwrap();
        let back: Distribution = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
