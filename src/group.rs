//! Temporal event grouping
//!
//! Coalesces consecutive events from one stream into incident groups. A
//! group is finalized either when the next event arrives beyond the allowed
//! inter-event gap, or when the event-time timer at `start + maxSpan` fires.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DetectError, Result};
use crate::event::EventGroup;

/// Temporal grouping tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrouperConfig {
    /// Maximum total duration of a group, in seconds
    pub maximum_event_length: u32,
    /// Maximum allowed gap between consecutive events, in seconds
    pub maximum_event_interval: u32,
}

impl Default for GrouperConfig {
    fn default() -> Self {
        Self {
            maximum_event_length: 60,
            maximum_event_interval: 10,
        }
    }
}

impl GrouperConfig {
    pub fn max_span(&self) -> Duration {
        Duration::seconds(i64::from(self.maximum_event_length))
    }

    pub fn max_gap(&self) -> Duration {
        Duration::seconds(i64::from(self.maximum_event_interval))
    }

    pub fn validate(&self) -> Result<()> {
        if self.maximum_event_length == 0 {
            return Err(DetectError::Config(
                "eventGrouping.time.maximumEventLength must be positive".to_string(),
            ));
        }
        if self.maximum_event_interval == 0 {
            return Err(DetectError::Config(
                "eventGrouping.time.maximumEventInterval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serializable grouper state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrouperState {
    pub active: Option<EventGroup>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Per-stream incident assembler
///
/// Every event offered is emitted exactly once as a member of exactly one
/// finalized group, provided the stream goes idle or its timer fires.
pub struct TemporalEventGrouper {
    config: GrouperConfig,
    active: Option<EventGroup>,
    deadline: Option<DateTime<Utc>>,
}

impl TemporalEventGrouper {
    pub fn new(config: GrouperConfig) -> Self {
        Self {
            config,
            active: None,
            deadline: None,
        }
    }

    /// The registered event-time timer, when a group is open
    pub fn timer_deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Offer an incoming group; returns the previous group when it finalizes
    pub fn offer(&mut self, group: EventGroup) -> Result<Option<EventGroup>> {
        if let Some(stray) = group
            .events
            .iter()
            .find(|e| e.stream_id != group.stream_id)
        {
            return Err(DetectError::MultiStreamGroup(format!(
                "{} and {}",
                group.stream_id, stray.stream_id
            )));
        }

        let last = match &self.active {
            None => {
                self.deadline = Some(group.start + self.config.max_span());
                self.active = Some(group);
                return Ok(None);
            }
            Some(active) => active.last_event_time(),
        };

        if group.start > last + self.config.max_gap() {
            // gap overflow: close the running incident at its last event
            self.deadline = Some(group.start + self.config.max_span());
            let finalized = self.active.replace(group).map(|mut g| {
                g.end = Some(last);
                g
            });
            if let Some(g) = &finalized {
                debug!(
                    stream = %g.stream_id,
                    events = g.events.len(),
                    "event group finalized on gap"
                );
            }
            return Ok(finalized);
        }

        if let Some(active) = self.active.as_mut() {
            active.events.extend(group.events);
        }
        Ok(None)
    }

    /// Fire the event-time timer; emits the open group ended at `at`
    pub fn on_timer(&mut self, at: DateTime<Utc>) -> Option<EventGroup> {
        self.deadline = None;
        let mut group = self.active.take()?;
        group.end = Some(at);
        debug!(
            stream = %group.stream_id,
            events = group.events.len(),
            "event group finalized on timer"
        );
        Some(group)
    }

    pub fn snapshot(&self) -> GrouperState {
        GrouperState {
            active: self.active.clone(),
            deadline: self.deadline,
        }
    }

    pub fn from_state(config: GrouperConfig, state: GrouperState) -> Self {
        Self {
            config,
            active: state.active,
            deadline: state.deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangepointEvent;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn event_at(stream: &str, secs: i64) -> ChangepointEvent {
        ChangepointEvent::new(stream, at(secs), at(secs), 50, "mean increased")
    }

    fn offer_single(g: &mut TemporalEventGrouper, secs: i64) -> Option<EventGroup> {
        g.offer(EventGroup::single(event_at("s1", secs))).unwrap()
    }

    #[test]
    fn test_merges_within_gap() {
        let mut g = TemporalEventGrouper::new(GrouperConfig::default());
        assert!(offer_single(&mut g, 0).is_none());
        assert!(offer_single(&mut g, 5).is_none());
        assert!(offer_single(&mut g, 9).is_none());

        // a later event past the gap closes the incident at its last event
        let finalized = offer_single(&mut g, 25).expect("group should finalize");
        assert_eq!(finalized.start, at(0));
        assert_eq!(finalized.end, Some(at(9)));
        assert_eq!(finalized.events.len(), 3);

        // and the new group starts fresh with its own timer
        assert_eq!(g.timer_deadline(), Some(at(25 + 60)));
    }

    #[test]
    fn test_timer_finalizes_open_group() {
        let mut g = TemporalEventGrouper::new(GrouperConfig::default());
        assert!(offer_single(&mut g, 0).is_none());
        assert_eq!(g.timer_deadline(), Some(at(60)));

        let finalized = g.on_timer(at(60)).expect("timer should emit");
        assert_eq!(finalized.start, at(0));
        assert_eq!(finalized.end, Some(at(60)));
        assert!(g.timer_deadline().is_none());
        assert!(g.on_timer(at(61)).is_none());
    }

    #[test]
    fn test_duplicate_events_keep_boundaries() {
        let mut g = TemporalEventGrouper::new(GrouperConfig::default());
        assert!(offer_single(&mut g, 0).is_none());
        assert!(offer_single(&mut g, 4).is_none());
        // the same timestamp offered twice must not move the boundaries
        assert!(offer_single(&mut g, 4).is_none());

        let finalized = g.on_timer(at(60)).unwrap();
        assert_eq!(finalized.start, at(0));
        assert_eq!(finalized.end, Some(at(60)));
        assert_eq!(finalized.last_event_time(), at(4));
    }

    #[test]
    fn test_gap_boundary_is_exclusive() {
        let mut g = TemporalEventGrouper::new(GrouperConfig::default());
        assert!(offer_single(&mut g, 0).is_none());
        // exactly at the gap still merges
        assert!(offer_single(&mut g, 10).is_none());
        // one second past the gap from the new last event finalizes
        assert!(offer_single(&mut g, 21).is_some());
    }

    #[test]
    fn test_multi_stream_group_rejected() {
        let mut g = TemporalEventGrouper::new(GrouperConfig::default());
        let mixed = EventGroup {
            stream_id: "s1".to_string(),
            start: at(0),
            end: None,
            events: vec![event_at("s1", 0), event_at("s2", 1)],
        };
        assert!(matches!(
            g.offer(mixed),
            Err(DetectError::MultiStreamGroup(_))
        ));
    }

    #[test]
    fn test_state_roundtrip() {
        let mut g = TemporalEventGrouper::new(GrouperConfig::default());
        assert!(offer_single(&mut g, 0).is_none());
        assert!(offer_single(&mut g, 3).is_none());

        let state = g.snapshot();
        let json = serde_json::to_string(&state).unwrap();
        let back: GrouperState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);

        let mut restored = TemporalEventGrouper::from_state(GrouperConfig::default(), back);
        let a = g.on_timer(at(60)).unwrap();
        let b = restored.on_timer(at(60)).unwrap();
        assert_eq!(a, b);
    }
}
