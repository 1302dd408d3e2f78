//! Bayesian online changepoint processor
//!
//! Per-stream state machine over a bounded set of run-length hypotheses.
//! Each measurement reweights the hypotheses; a changepoint is reported only
//! after the most likely hypothesis has kept moving for `triggerCount`
//! consecutive measurements, the shift clears the severity threshold, and
//! the stream is outside its event-rate limit. Lonely outliers are cancelled
//! by restoring the last known-normal hypothesis set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DetectError, Result};
use crate::event::ChangepointEvent;
use crate::measurement::Measurement;
use crate::stats::Distribution;

use super::run::{Run, RunSet};
use super::severity::mean_shift_severity;
use super::ChangepointConfig;

/// Sentinel weight on the composite old-normal run
const COMPOSITE_PROB: f64 = -2.0;

/// Sentinel weight on the old-normal placeholder used before any snapshot
const EMPTY_NORMAL_PROB: f64 = -1.0;

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Serializable per-stream detector state
///
/// Restoring a snapshot and replaying the same measurements yields the same
/// outputs as the original processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorState {
    pub current_runs: RunSet,
    pub normal_runs: RunSet,
    pub composite_old_normal: Option<Run>,
    pub last_observed: Option<Measurement>,
    pub last_event_time: Option<DateTime<Utc>>,
    pub consecutive_anomalies: u32,
    pub consecutive_normal_after_outlier: u32,
    pub previous_most_likely_index: usize,
}

/// Per-stream changepoint detector
pub struct ChangepointProcessor {
    stream_id: String,
    config: ChangepointConfig,
    initial: Distribution,
    current: RunSet,
    normal: RunSet,
    composite_old_normal: Option<Run>,
    last_observed: Option<Measurement>,
    last_event_time: Option<DateTime<Utc>>,
    consecutive_anomalies: u32,
    consecutive_normal_after_outlier: u32,
    previous_most_likely: usize,
}

impl ChangepointProcessor {
    pub fn new(stream_id: impl Into<String>, config: ChangepointConfig) -> Self {
        Self {
            stream_id: stream_id.into(),
            config,
            initial: Distribution::default(),
            current: RunSet::default(),
            normal: RunSet::default(),
            composite_old_normal: None,
            last_observed: None,
            last_event_time: None,
            consecutive_anomalies: 0,
            consecutive_normal_after_outlier: 0,
            previous_most_likely: 0,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn config(&self) -> &ChangepointConfig {
        &self.config
    }

    /// Snapshot the per-stream state for checkpointing
    pub fn snapshot(&self) -> ProcessorState {
        ProcessorState {
            current_runs: self.current.clone(),
            normal_runs: self.normal.clone(),
            composite_old_normal: self.composite_old_normal.clone(),
            last_observed: self.last_observed.clone(),
            last_event_time: self.last_event_time,
            consecutive_anomalies: self.consecutive_anomalies,
            consecutive_normal_after_outlier: self.consecutive_normal_after_outlier,
            previous_most_likely_index: self.previous_most_likely,
        }
    }

    /// Rebuild a processor from a checkpoint
    pub fn from_state(
        stream_id: impl Into<String>,
        config: ChangepointConfig,
        state: ProcessorState,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            config,
            initial: Distribution::default(),
            current: state.current_runs,
            normal: state.normal_runs,
            composite_old_normal: state.composite_old_normal,
            last_observed: state.last_observed,
            last_event_time: state.last_event_time,
            consecutive_anomalies: state.consecutive_anomalies,
            consecutive_normal_after_outlier: state.consecutive_normal_after_outlier,
            previous_most_likely: state.previous_most_likely_index,
        }
    }

    /// Feed one measurement; returns an event when a changepoint is reported
    pub fn update(&mut self, m: &Measurement) -> Result<Option<ChangepointEvent>> {
        if m.stream_id != self.stream_id {
            return Err(DetectError::InvalidInput(format!(
                "measurement for stream {} routed to {}",
                m.stream_id, self.stream_id
            )));
        }
        let Some(x) = m.default_value else {
            return Err(DetectError::InvalidInput(format!(
                "measurement without value on stream {}",
                self.stream_id
            )));
        };

        // first observation, or stream idle past the purge window
        let Some(last) = &self.last_observed else {
            self.reset(m);
            return Ok(None);
        };
        if m.time.signed_duration_since(last.time) >= self.config.inactivity_purge() {
            debug!(stream = %self.stream_id, "inactivity purge, resetting detector");
            self.reset(m);
            return Ok(None);
        }

        // out-of-order measurements are still processed but never move the clock
        if m.time >= last.time {
            self.last_observed = Some(m.clone());
        }

        // remember what normal looked like while we are not suspicious
        if self.consecutive_anomalies == 0 {
            self.normal = self.current.clone();
            self.composite_old_normal = Some(self.make_composite());
        }

        let Some(next) = self
            .current
            .updated(x, m.time, &self.initial, self.config.max_history)
        else {
            warn!(stream = %self.stream_id, "probability mass saturated, resetting detector");
            self.reset(m);
            return Ok(None);
        };
        self.current = next;
        if self.current.is_empty() {
            warn!(stream = %self.stream_id, "update produced no runs, resetting detector");
            self.reset(m);
            return Ok(None);
        }

        let most_likely = self.current.most_likely();
        if most_likely != self.previous_most_likely {
            self.consecutive_anomalies += 1;
        }

        let len = self.current.len();
        let best_fit = self.current.best_fit(x);
        if len >= 2 && best_fit == len - 2 {
            // the hypothesis from just before the disturbance still fits best
            self.consecutive_normal_after_outlier += 1;
            if self.consecutive_normal_after_outlier > self.config.ignore_outlier_after {
                debug!(stream = %self.stream_id, "lonely outlier cancelled");
                if let Some(restored) =
                    self.normal
                        .updated(x, m.time, &self.initial, self.config.max_history)
                {
                    self.current = restored;
                }
                self.consecutive_anomalies = 0;
                self.consecutive_normal_after_outlier = 0;
                self.previous_most_likely = self.current.most_likely();
                return Ok(None);
            }
        } else {
            self.consecutive_normal_after_outlier = 0;
        }
        if most_likely == self.previous_most_likely {
            self.consecutive_anomalies = 0;
            self.consecutive_normal_after_outlier = 0;
        }
        self.previous_most_likely = most_likely;

        if self.consecutive_anomalies > self.config.trigger_count {
            let event = self.consider_emission(m, most_likely);
            self.consecutive_anomalies = 0;
            if event.is_some() {
                return Ok(event);
            }
        }
        Ok(None)
    }

    fn consider_emission(
        &mut self,
        m: &Measurement,
        most_likely: usize,
    ) -> Option<ChangepointEvent> {
        let new_normal = self.current.post_change()?.clone();
        let old_normal = self
            .composite_old_normal
            .clone()
            .unwrap_or_else(|| Run::new(self.initial, EMPTY_NORMAL_PROB, epoch()));

        let severity = mean_shift_severity(old_normal.dist.mean(), new_normal.dist.mean());
        if severity <= self.config.severity_threshold {
            debug!(
                stream = %self.stream_id,
                severity, "shift below severity threshold, not emitting"
            );
            return None;
        }
        if let Some(last_event) = self.last_event_time {
            if m.time.signed_duration_since(last_event) < self.config.min_event_interval() {
                debug!(stream = %self.stream_id, "event rate limited");
                return None;
            }
        }

        let old_mean = old_normal.dist.mean();
        let new_mean = new_normal.dist.mean();
        let direction = if new_mean > old_mean { "increased" } else { "decreased" };
        let description = format!(
            "mean {} from {:.2} to {:.2}",
            direction, old_mean, new_mean
        );

        let start = self.current.runs()[most_likely].start;
        let event = ChangepointEvent::new(self.stream_id.clone(), m.time, start, severity, description);

        info!(
            stream = %self.stream_id,
            severity,
            old_mean,
            new_mean,
            "changepoint detected"
        );
        self.last_event_time = Some(m.time);
        self.reset(m);
        Some(event)
    }

    /// The detector's memory of the regime before the current disturbance:
    /// the best-established distribution, stamped with the start of the
    /// previously most likely run.
    fn make_composite(&self) -> Run {
        let runs = self.current.runs();
        if runs.is_empty() {
            return Run::new(self.initial, EMPTY_NORMAL_PROB, epoch());
        }
        let dist = self
            .current
            .largest_n()
            .map(|r| r.dist)
            .unwrap_or(self.initial);
        let anchor = self.previous_most_likely.min(runs.len() - 1);
        Run::new(dist, COMPOSITE_PROB, runs[anchor].start)
    }

    /// Drop all hypotheses and reseed from `m`; the event-rate clock survives
    fn reset(&mut self, m: &Measurement) {
        self.current = RunSet::default();
        self.normal = RunSet::default();
        self.composite_old_normal = None;
        self.last_observed = Some(m.clone());
        self.consecutive_anomalies = 0;
        self.consecutive_normal_after_outlier = 0;
        self.previous_most_likely = 0;
    }
}
