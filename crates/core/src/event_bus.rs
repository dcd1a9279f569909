//! Event sink seam. The rotator reports every select/click through an
//! `Arc<dyn EventSink>` without waiting on the delivery transport.

use crate::error::{RotatorError, RotatorResult};
use crate::types::{Event, EventType};
use parking_lot::Mutex;
use std::sync::Arc;

/// Non-blocking sink for rotation events. An `Err` means the event was not
/// accepted; callers log it and carry on.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event) -> RotatorResult<()>;
}

/// No-op sink for tests and deployments with events disabled.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: Event) -> RotatorResult<()> {
        Ok(())
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<Event>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: Event) -> RotatorResult<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Sink that rejects everything; exercises the swallow-and-log path.
pub struct RejectingSink;

impl EventSink for RejectingSink {
    fn emit(&self, _event: Event) -> RotatorResult<()> {
        Err(RotatorError::EventQueue("sink unavailable".into()))
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ScopeKey;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        let scope = ScopeKey::new("s-1", "g-1");
        assert_eq!(sink.count(), 0);

        sink.emit(Event::now(EventType::Select, &scope, "b-1")).unwrap();
        sink.emit(Event::now(EventType::Click, &scope, "b-1")).unwrap();
        sink.emit(Event::now(EventType::Select, &scope, "b-2")).unwrap();

        assert_eq!(sink.count(), 3);
        assert_eq!(sink.count_type(EventType::Select), 2);
        assert_eq!(sink.count_type(EventType::Click), 1);
        assert_eq!(sink.events()[2].banner_id, "b-2");
    }

    #[test]
    fn test_noop_and_rejecting_sinks() {
        let scope = ScopeKey::new("s-1", "g-1");
        assert!(noop_sink()
            .emit(Event::now(EventType::Click, &scope, "b-1"))
            .is_ok());
        assert!(RejectingSink
            .emit(Event::now(EventType::Click, &scope, "b-1"))
            .is_err());
    }
}
