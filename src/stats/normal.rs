//! Normal distribution with incremental updates
//!
//! Mean and variance are maintained with Welford's recurrence so a run
//! hypothesis can absorb one observation at a time in O(1).

use serde::{Deserialize, Serialize};

/// Variance assigned to a hypothesis holding fewer than two observations.
/// A single-sample run must be wide enough that an established run out-fits
/// it on in-regime data.
pub const INITIAL_VARIANCE: f64 = 1.0e4;

/// Lower bound on the variance of an established run; keeps the density
/// finite on degenerate (constant-valued) runs.
pub const MIN_VARIANCE: f64 = 1.0e-6;

const SQRT_TAU: f64 = 2.5066282746310002;

/// Gaussian model with Welford running statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalDistribution {
    /// Running mean
    pub mean: f64,
    /// Sum of squared deviations (Welford's M2)
    pub m2: f64,
    /// Observation count
    pub n: u32,
}

impl NormalDistribution {
    /// A new distribution incorporating `x` as its `new_n`-th observation
    ///
    /// `new_n <= 1` discards history and restarts from `x`.
    pub fn with_value(&self, x: f64, new_n: u32) -> NormalDistribution {
        if new_n <= 1 {
            return NormalDistribution {
                mean: x,
                m2: 0.0,
                n: 1,
            };
        }
        let delta = x - self.mean;
        let mean = self.mean + delta / f64::from(new_n);
        let delta2 = x - mean;
        NormalDistribution {
            mean,
            m2: self.m2 + delta * delta2,
            n: new_n,
        }
    }

    /// Sample variance, floored so the density stays finite
    #[inline]
    pub fn variance(&self) -> f64 {
        if self.n < 2 {
            INITIAL_VARIANCE
        } else {
            (self.m2 / f64::from(self.n - 1)).max(MIN_VARIANCE)
        }
    }

    /// Standard deviation
    #[inline]
    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Gaussian density at `x`
    #[inline]
    pub fn pdf(&self, x: f64) -> f64 {
        let var = self.variance();
        let d = x - self.mean;
        (-d * d / (2.0 * var)).exp() / (var.sqrt() * SQRT_TAU)
    }
}
