//! Event sink trait and implementations.

use async_trait::async_trait;
use tracing::{debug, info, Level};

use super::RunEvent;

/// Receives run-log events.
///
/// `try_emit` must never fail or block the caller; it is what the engine
/// uses from inside its scheduling loop.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>);

    /// Emits an event without blocking. Errors are swallowed.
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>);
}

/// Discards all events. The default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn log(&self, event_type: &str, data: &Option<serde_json::Value>) {
        if self.level == Level::DEBUG {
            debug!(target: "dealflow.events", event_type, payload = ?data, "run event");
        } else {
            info!(target: "dealflow.events", event_type, payload = ?data, "run event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log(event_type, &data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log(event_type, &data);
    }
}

/// Collects events in memory, preserving arrival order.
///
/// Backs the run report's audit log; also convenient in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<RunEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event_type: &str, data: Option<serde_json::Value>) {
        let mut events = self.events.write();
        let seq = events.len() as u64;
        events.push(RunEvent::new(seq, event_type, data));
    }

    /// All collected events in order.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.read().clone()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True when nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.push(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.push(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink_accepts_everything() {
        let sink = NoOpEventSink;
        sink.emit("anything", None).await;
        sink.try_emit("anything", Some(serde_json::json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_collecting_sink_orders_and_numbers() {
        let sink = CollectingEventSink::new();
        sink.emit("run.started", None).await;
        sink.try_emit("stage.started", Some(serde_json::json!({"stage": "strategy"})));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[0].event_type, "run.started");
        assert_eq!(events[1].seq, 1);
    }

    #[tokio::test]
    async fn test_collecting_sink_prefix_filter() {
        let sink = CollectingEventSink::new();
        sink.emit("stage.started", None).await;
        sink.emit("stage.committed", None).await;
        sink.emit("tool.invoked", None).await;

        assert_eq!(sink.events_of_type("stage.").len(), 2);
        assert_eq!(sink.events_of_type("tool.").len(), 1);
    }

    #[tokio::test]
    async fn test_logging_sink_does_not_panic() {
        let sink = LoggingEventSink::default();
        sink.emit("checkpoint.approved", Some(serde_json::json!({"stage": "valuation"})))
            .await;
        sink.try_emit("checkpoint.approved", None);
    }
}
