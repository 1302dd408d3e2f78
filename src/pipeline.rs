//! Keyed per-stream dataflow
//!
//! Shards measurements by `stream_id` and owns one detector and one grouper
//! per shard. Within a shard everything is synchronous and processed in
//! arrival order; across shards there is no shared mutable state. Timers are
//! event-time timers driven by the per-stream watermark.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::Config;
use crate::detect::{ChangepointProcessor, ProcessorState};
use crate::error::Result;
use crate::event::EventGroup;
use crate::group::{GrouperState, TemporalEventGrouper};
use crate::measurement::Measurement;

/// Counters over everything the pipeline has seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub measurements_seen: u64,
    pub dropped_lossy: u64,
    pub dropped_missing_value: u64,
    pub dropped_late: u64,
    pub events_emitted: u64,
    pub groups_emitted: u64,
}

struct KeyState {
    processor: ChangepointProcessor,
    grouper: TemporalEventGrouper,
    watermark: DateTime<Utc>,
}

/// Checkpoint record for one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStateRecord {
    pub stream_id: String,
    pub processor: ProcessorState,
    pub grouper: GrouperState,
    pub watermark: DateTime<Utc>,
}

/// Whole-pipeline checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub keys: Vec<KeyStateRecord>,
    pub stats: PipelineStats,
}

/// Keyed detector + grouper dataflow
pub struct Pipeline {
    config: Config,
    keys: HashMap<String, KeyState>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            keys: HashMap::new(),
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn stream_count(&self) -> usize {
        self.keys.len()
    }

    /// Feed one measurement; returns any incident groups finalized by it
    pub fn process(&mut self, m: &Measurement) -> Result<Vec<EventGroup>> {
        self.stats.measurements_seen += 1;

        if m.lossy {
            trace!(stream = %m.stream_id, "dropping lossy measurement");
            self.stats.dropped_lossy += 1;
            return Ok(Vec::new());
        }
        if m.default_value.is_none() {
            debug!(stream = %m.stream_id, "dropping measurement without value");
            self.stats.dropped_missing_value += 1;
            return Ok(Vec::new());
        }

        let lateness = self.config.pipeline.allowed_lateness();
        let changepoint = self.config.detector.changepoint.clone();
        let grouping = self.config.event_grouping.time.clone();

        let key = self
            .keys
            .entry(m.stream_id.clone())
            .or_insert_with(|| KeyState {
                processor: ChangepointProcessor::new(m.stream_id.clone(), changepoint),
                grouper: TemporalEventGrouper::new(grouping),
                watermark: m.time,
            });

        if m.time < key.watermark - lateness {
            debug!(stream = %m.stream_id, "dropping late measurement");
            self.stats.dropped_late += 1;
            return Ok(Vec::new());
        }
        if m.time > key.watermark {
            key.watermark = m.time;
        }

        let mut finalized = Vec::new();

        // event-time timers fire as soon as the watermark passes them
        while let Some(deadline) = key.grouper.timer_deadline() {
            if deadline > key.watermark {
                break;
            }
            if let Some(group) = key.grouper.on_timer(deadline) {
                finalized.push(group);
            }
        }

        if let Some(event) = key.processor.update(m)? {
            self.stats.events_emitted += 1;
            if let Some(group) = key.grouper.offer(EventGroup::single(event))? {
                finalized.push(group);
            }
        }

        self.stats.groups_emitted += finalized.len() as u64;
        Ok(finalized)
    }

    /// Advance every stream's watermark, firing any due timers
    pub fn advance_watermark(&mut self, to: DateTime<Utc>) -> Vec<EventGroup> {
        let mut finalized = Vec::new();
        for key in self.keys.values_mut() {
            if to > key.watermark {
                key.watermark = to;
            }
            while let Some(deadline) = key.grouper.timer_deadline() {
                if deadline > key.watermark {
                    break;
                }
                if let Some(group) = key.grouper.on_timer(deadline) {
                    finalized.push(group);
                }
            }
        }
        self.stats.groups_emitted += finalized.len() as u64;
        finalized
    }

    /// Close every open group at its registered deadline
    ///
    /// Used when a source is exhausted and no further watermark will arrive.
    pub fn flush(&mut self) -> Vec<EventGroup> {
        let mut finalized = Vec::new();
        for key in self.keys.values_mut() {
            if let Some(deadline) = key.grouper.timer_deadline() {
                if let Some(group) = key.grouper.on_timer(deadline) {
                    finalized.push(group);
                }
            }
        }
        self.stats.groups_emitted += finalized.len() as u64;
        finalized
    }

    /// Serialize all per-stream state
    pub fn snapshot(&self) -> PipelineSnapshot {
        let mut keys: Vec<KeyStateRecord> = self
            .keys
            .iter()
            .map(|(stream_id, key)| KeyStateRecord {
                stream_id: stream_id.clone(),
                processor: key.processor.snapshot(),
                grouper: key.grouper.snapshot(),
                watermark: key.watermark,
            })
            .collect();
        keys.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        PipelineSnapshot {
            keys,
            stats: self.stats,
        }
    }

    /// Rebuild a pipeline from a checkpoint
    pub fn restore(config: Config, snapshot: PipelineSnapshot) -> Self {
        let mut keys = HashMap::new();
        for record in snapshot.keys {
            keys.insert(
                record.stream_id.clone(),
                KeyState {
                    processor: ChangepointProcessor::from_state(
                        record.stream_id.clone(),
                        config.detector.changepoint.clone(),
                        record.processor,
                    ),
                    grouper: TemporalEventGrouper::from_state(
                        config.event_grouping.time.clone(),
                        record.grouper,
                    ),
                    watermark: record.watermark,
                },
            );
        }
        Self {
            config,
            keys,
            stats: snapshot.stats,
        }
    }
}
