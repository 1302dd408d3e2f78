//! Anomaly events
//!
//! `ChangepointEvent` is what detectors emit; `EventGroup` is what the
//! temporal grouper assembles from them. Events serialize to the
//! line-protocol wire format consumed by time-series sinks.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DetectError, Result};

/// A detected anomaly on one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangepointEvent {
    /// Unique event id
    pub id: Uuid,
    /// Stream the anomaly was detected on
    pub stream_id: String,
    /// Event type tag carried into the wire format
    pub event_type: String,
    /// Detection time
    pub time: DateTime<Utc>,
    /// Estimated start of the changed regime
    pub start: DateTime<Utc>,
    /// Severity in 0..=100
    pub severity: u8,
    /// Time between the regime change and its detection
    pub detection_latency: Duration,
    /// Human-readable direction and magnitude of the shift
    pub description: String,
    /// Caller-supplied tags merged into the wire format
    pub tags: BTreeMap<String, String>,
}

impl ChangepointEvent {
    pub fn new(
        stream_id: impl Into<String>,
        time: DateTime<Utc>,
        start: DateTime<Utc>,
        severity: u8,
        description: impl Into<String>,
    ) -> Self {
        let latency = (time - start).to_std().unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            stream_id: stream_id.into(),
            event_type: "changepoint".to_string(),
            time,
            start,
            severity,
            detection_latency: latency,
            description: description.into(),
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    /// Encode as a line-protocol record
    ///
    /// `<type>,<tags> <fields> <nanos>` with tags and fields sorted
    /// lexicographically. The `stream` and `event_type` tags are always
    /// present; integer fields carry the `i` suffix.
    pub fn to_line_protocol(&self) -> String {
        let mut tags = self.tags.clone();
        tags.insert("event_type".to_string(), self.event_type.clone());
        tags.insert("stream".to_string(), self.stream_id.clone());

        let tag_list = tags
            .iter()
            .map(|(k, v)| format!("{}={}", escape_tag(k), escape_tag(v)))
            .collect::<Vec<_>>()
            .join(",");

        // field keys in lexicographic order: description, detection_latency, severity
        let fields = format!(
            "description=\"{}\",detection_latency={}i,severity={}i",
            escape_field_string(&self.description),
            self.detection_latency.as_nanos(),
            self.severity,
        );

        let nanos = self.time.timestamp_nanos_opt().unwrap_or_default();
        format!("{},{} {} {}", self.event_type, tag_list, fields, nanos)
    }
}

fn escape_tag(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == ',' || c == '=' || c == ' ' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_field_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Consecutive events from one stream treated as a single incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventGroup {
    /// Stream shared by every member event
    pub stream_id: String,
    /// Time of the first member event
    pub start: DateTime<Utc>,
    /// Set when the group is finalized and emitted
    pub end: Option<DateTime<Utc>>,
    /// Member events, non-decreasing in time
    pub events: Vec<ChangepointEvent>,
}

impl EventGroup {
    /// Group holding a single event
    pub fn single(event: ChangepointEvent) -> Self {
        Self {
            stream_id: event.stream_id.clone(),
            start: event.time,
            end: None,
            events: vec![event],
        }
    }

    /// Build a group from events, enforcing the single-stream invariant
    pub fn from_events(events: Vec<ChangepointEvent>) -> Result<Self> {
        let first = events
            .first()
            .ok_or_else(|| DetectError::InvalidInput("empty event group".to_string()))?;
        let stream_id = first.stream_id.clone();
        if let Some(stray) = events.iter().find(|e| e.stream_id != stream_id) {
            return Err(DetectError::MultiStreamGroup(format!(
                "{} and {}",
                stream_id, stray.stream_id
            )));
        }
        Ok(Self {
            stream_id,
            start: first.time,
            end: None,
            events,
        })
    }

    /// Time of the latest member event
    pub fn last_event_time(&self) -> DateTime<Utc> {
        self.events
            .iter()
            .map(|e| e.time)
            .max()
            .unwrap_or(self.start)
    }

    /// Highest severity among member events
    pub fn max_severity(&self) -> u8 {
        self.events.iter().map(|e| e.severity).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_at(stream: &str, secs: i64, severity: u8) -> ChangepointEvent {
        let t = Utc.timestamp_opt(secs, 0).unwrap();
        ChangepointEvent::new(stream, t, t, severity, "mean increased from 50.00 to 150.00")
    }

    #[test]
    fn test_line_protocol_layout() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let start = Utc.timestamp_opt(1_699_999_988, 0).unwrap();
        let e = ChangepointEvent::new("probe 1", t, start, 42, "mean increased")
            .with_tag("region", "eu,west");

        let line = e.to_line_protocol();
        assert_eq!(
            line,
            "changepoint,event_type=changepoint,region=eu\\,west,stream=probe\\ 1 \
             description=\"mean increased\",detection_latency=12000000000i,severity=42i \
             1700000000000000000"
        );
    }

    #[test]
    fn test_field_string_escaping() {
        let t = Utc.timestamp_opt(0, 0).unwrap();
        let e = ChangepointEvent::new("s", t, t, 1, "say \"hi\" \\ bye");
        assert!(e
            .to_line_protocol()
            .contains("description=\"say \\\"hi\\\" \\\\ bye\""));
    }

    #[test]
    fn test_group_rejects_mixed_streams() {
        let events = vec![event_at("a", 0, 10), event_at("b", 1, 10)];
        let err = EventGroup::from_events(events).unwrap_err();
        assert!(matches!(err, DetectError::MultiStreamGroup(_)));
    }

    #[test]
    fn test_group_boundaries() {
        let events = vec![event_at("a", 0, 10), event_at("a", 5, 30), event_at("a", 9, 20)];
        let g = EventGroup::from_events(events).unwrap();
        assert_eq!(g.start, Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(g.last_event_time(), Utc.timestamp_opt(9, 0).unwrap());
        assert_eq!(g.max_severity(), 30);
        assert!(g.end.is_none());
    }
}
