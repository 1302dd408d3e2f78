//! Run-length hypotheses
//!
//! A run is the hypothesis that the most recent changepoint happened at a
//! specific past instant, together with the distribution fitted to the
//! observations since then and its posterior weight. The processor keeps a
//! bounded, oldest-first ordered set of runs and reweights it per
//! measurement following the Adams & MacKay (2007) constant-hazard scheme.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::Distribution;

/// Prior probability per step that a changepoint occurs now (1/lambda with
/// an expected run length of 250 observations).
pub const HAZARD_PRIOR: f64 = 1.0 / 250.0;

/// Prior probability per step of no change; scales every surviving run.
pub const GROWTH_FACTOR: f64 = 1.0 - HAZARD_PRIOR;

/// One changepoint hypothesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Distribution fitted to the observations since `start`
    pub dist: Distribution,
    /// Posterior weight of this hypothesis
    pub prob: f64,
    /// When this run began
    pub start: DateTime<Utc>,
}

impl Run {
    pub fn new(dist: Distribution, prob: f64, start: DateTime<Utc>) -> Self {
        Self { dist, prob, start }
    }
}

/// Ordered (oldest first) collection of run hypotheses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSet {
    runs: Vec<Run>,
}

impl RunSet {
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// The run hypothesis most supported by the posterior
    ///
    /// The newest run is excluded from the comparison; it would otherwise
    /// win by construction right after a large residual. Ties keep the
    /// oldest candidate.
    pub fn most_likely(&self) -> usize {
        if self.runs.len() < 2 {
            return 0;
        }
        let mut best = 0;
        for (i, r) in self.runs[..self.runs.len() - 1].iter().enumerate() {
            if r.prob > self.runs[best].prob {
                best = i;
            }
        }
        best
    }

    /// Index of the run whose density best explains `x`
    ///
    /// Ties go to the youngest candidate so degenerate (constant-valued)
    /// runs resolve to the most recent hypothesis.
    pub fn best_fit(&self, x: f64) -> usize {
        let mut best = 0;
        let mut best_pdf = f64::NEG_INFINITY;
        for (i, r) in self.runs.iter().enumerate() {
            let pdf = r.dist.pdf_at(x);
            if pdf >= best_pdf {
                best = i;
                best_pdf = pdf;
            }
        }
        best
    }

    /// The post-change hypothesis: the run holding a single observation,
    /// falling back to the newest run if pruning removed it
    pub fn post_change(&self) -> Option<&Run> {
        self.runs
            .iter()
            .find(|r| r.dist.n() == 1)
            .or_else(|| self.runs.last())
    }

    /// The run with the most absorbed observations
    pub fn largest_n(&self) -> Option<&Run> {
        self.runs.iter().max_by_key(|r| r.dist.n())
    }

    /// One reweighting step over the whole set
    ///
    /// Every surviving run absorbs `x` and is scaled by its predictive
    /// density and the no-change prior; a fresh single-observation run is
    /// appended with the hazard prior. The set is then truncated oldest
    /// first to `max_history` and its weights normalized to sum to one.
    ///
    /// Returns `None` when the probability mass comes out non-finite or
    /// non-positive; callers treat that as a detector reset.
    pub fn updated(
        &self,
        x: f64,
        at: DateTime<Utc>,
        initial: &Distribution,
        max_history: usize,
    ) -> Option<RunSet> {
        let mut next = Vec::with_capacity(self.runs.len() + 1);
        for r in &self.runs {
            let weight = r.prob * r.dist.pdf_at(x) * GROWTH_FACTOR;
            next.push(Run::new(r.dist.with_value(x, r.dist.n() + 1), weight, r.start));
        }
        next.push(Run::new(initial.with_value(x, 1), HAZARD_PRIOR, at));

        if next.len() > max_history {
            let excess = next.len() - max_history;
            next.drain(..excess);
        }

        let mass: f64 = next.iter().map(|r| r.prob).sum();
        if !mass.is_finite() || mass <= 0.0 {
            return None;
        }
        for r in &mut next {
            r.prob /= mass;
        }
        Some(RunSet { runs: next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn grow(values: &[f64], max_history: usize) -> RunSet {
        let initial = Distribution::default();
        let mut set = RunSet::default();
        for (i, &x) in values.iter().enumerate() {
            set = set.updated(x, at(i as i64), &initial, max_history).unwrap();
        }
        set
    }

    #[test]
    fn test_update_appends_fresh_run() {
        let set = grow(&[50.0], 20);
        assert_eq!(set.len(), 1);
        assert_eq!(set.runs()[0].dist.n(), 1);
        assert!((set.runs()[0].prob - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_probability_mass_normalized() {
        let set = grow(&[50.0, 51.0, 49.0, 50.5, 48.5, 52.0], 20);
        let mass: f64 = set.runs().iter().map(|r| r.prob).sum();
        assert!((mass - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_truncation_keeps_newest() {
        let values: Vec<f64> = (0..30).map(|i| 50.0 + (i % 3) as f64).collect();
        let set = grow(&values, 10);
        assert_eq!(set.len(), 10);
        // the newest run started at the last observation
        assert_eq!(set.runs().last().unwrap().start, at(29));
        // oldest surviving run is 10 steps old
        assert_eq!(set.runs()[0].start, at(20));
    }

    #[test]
    fn test_most_likely_excludes_newest() {
        let set = grow(&[50.0, 50.2, 49.8, 50.1], 20);
        let most = set.most_likely();
        assert!(most < set.len() - 1);
        // a steady stream keeps the oldest hypothesis dominant
        assert_eq!(most, 0);
    }

    #[test]
    fn test_best_fit_prefers_youngest_on_ties() {
        // constant data floors every established run's variance, so the
        // densities tie and the second-newest hypothesis must win
        let set = grow(&[50.0; 8], 20);
        let best = set.best_fit(50.0);
        assert_eq!(best, set.len() - 2);
    }

    #[test]
    fn test_post_change_is_single_observation_run() {
        let set = grow(&[50.0, 50.0, 50.0, 120.0], 20);
        let post = set.post_change().unwrap();
        assert_eq!(post.dist.n(), 1);
        assert_eq!(post.dist.mean(), 120.0);
    }

    #[test]
    fn test_largest_n_is_oldest_survivor() {
        let set = grow(&[50.0, 51.0, 49.0, 50.0, 50.0], 20);
        assert_eq!(set.largest_n().unwrap().dist.n(), 5);
    }

    #[test]
    fn test_saturated_mass_reports_none() {
        let initial = Distribution::default();
        let mut set = RunSet::default();
        set = set.updated(50.0, at(0), &initial, 20).unwrap();
        assert!(set.updated(f64::NAN, at(1), &initial, 20).is_none());
    }
}
