//! Run-log events and event sinks.
//!
//! Every observable step of a run — stage lifecycle, checkpoint decisions,
//! tool attempts — is emitted as a typed name plus a JSON payload. Sinks
//! decide what to do with them; the orchestrator always keeps a collecting
//! sink so the run report can expose the full audit sequence.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single structured entry in the run's audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Position in the run's event sequence, starting at 0.
    pub seq: u64,
    /// Dotted event name, e.g. `stage.committed` or `tool.retry`.
    pub event_type: String,
    /// Event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// When the event was recorded.
    pub at: DateTime<Utc>,
}

impl RunEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(seq: u64, event_type: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            seq,
            event_type: event_type.into(),
            data,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_event_serialization() {
        let event = RunEvent::new(3, "stage.committed", Some(serde_json::json!({"stage": "legal"})));
        let json = serde_json::to_string(&event).unwrap();
        let back: RunEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(back.seq, 3);
        assert_eq!(back.event_type, "stage.committed");
        assert_eq!(back.data, Some(serde_json::json!({"stage": "legal"})));
    }
}
