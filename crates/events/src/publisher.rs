//! Bounded hand-off between request handlers and the event transport.

use crate::queue::EventQueue;
use rotator_core::error::{RotatorError, RotatorResult};
use rotator_core::event_bus::EventSink;
use rotator_core::types::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Event sink with a background drain task. `emit` only enqueues; when the
/// queue is full the event is dropped and counted.
pub struct EventPublisher {
    sender: mpsc::Sender<Event>,
}

impl EventPublisher {
    /// Create the publisher and spawn its drain task. The task ends once
    /// every clone of the publisher's sender is gone and the queue is empty.
    pub fn spawn(queue: Arc<dyn EventQueue>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel::<Event>(capacity.max(1));
        let handle = tokio::spawn(drain(queue, receiver));

        info!(capacity, "Event publisher started");
        (Self { sender }, handle)
    }
}

impl EventSink for EventPublisher {
    fn emit(&self, event: Event) -> RotatorResult<()> {
        match self.sender.try_send(event) {
            Ok(()) => {
                metrics::counter!("events.queued").increment(1);
                Ok(())
            }
            Err(TrySendError::Full(event)) => {
                metrics::counter!("events.dropped").increment(1);
                warn!(
                    event_type = ?event.event_type,
                    slot_id = %event.slot_id,
                    banner_id = %event.banner_id,
                    "Event queue full, dropping event"
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => {
                metrics::counter!("events.dropped").increment(1);
                Err(RotatorError::EventQueue("event publisher stopped".into()))
            }
        }
    }
}

async fn drain(queue: Arc<dyn EventQueue>, mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match queue.publish(&event).await {
            Ok(()) => {
                metrics::counter!("events.published").increment(1);
                debug!(event_type = ?event.event_type, banner_id = %event.banner_id, "Event published");
            }
            Err(e) => {
                metrics::counter!("events.publish_errors").increment(1);
                error!(error = %e, event_type = ?event.event_type, "Failed to publish event");
            }
        }
    }
    info!("Event publisher drained");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rotator_core::types::{EventType, ScopeKey};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingQueue {
        published: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventQueue for RecordingQueue {
        async fn publish(&self, event: &Event) -> RotatorResult<()> {
            self.published.lock().push(event.clone());
            Ok(())
        }
    }

    /// Holds every publish until released, so the channel can fill up.
    struct GatedQueue {
        gate: Notify,
    }

    #[async_trait]
    impl EventQueue for GatedQueue {
        async fn publish(&self, _event: &Event) -> RotatorResult<()> {
            self.gate.notified().await;
            Ok(())
        }
    }

    struct FailingQueue;

    #[async_trait]
    impl EventQueue for FailingQueue {
        async fn publish(&self, _event: &Event) -> RotatorResult<()> {
            Err(RotatorError::EventQueue("broker down".into()))
        }
    }

    fn event(banner: &str) -> Event {
        Event::now(EventType::Select, &ScopeKey::new("s-1", "g-1"), banner)
    }

    #[tokio::test]
    async fn test_events_reach_queue_in_order() {
        let queue = Arc::new(RecordingQueue::default());
        let (publisher, handle) = EventPublisher::spawn(queue.clone(), 16);
        for banner in ["b-1", "b-2", "b-3"] {
            publisher.emit(event(banner)).unwrap();
        }
        drop(publisher);
        handle.await.unwrap();

        let banners: Vec<String> = queue
            .published
            .lock()
            .iter()
            .map(|e| e.banner_id.clone())
            .collect();
        assert_eq!(banners, vec!["b-1", "b-2", "b-3"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_error() {
        let queue = Arc::new(GatedQueue {
            gate: Notify::new(),
        });
        let (publisher, _handle) = EventPublisher::spawn(queue.clone(), 1);
        // One may be in flight inside the gated publish, one buffered; the
        // rest are dropped, and none of them fail the caller.
        for i in 0..10 {
            publisher.emit(event(&format!("b-{i}"))).unwrap();
        }
        assert_eq!(publisher.sender.capacity(), 0);
    }

    #[tokio::test]
    async fn test_publish_failures_do_not_stop_drain() {
        let (publisher, handle) = EventPublisher::spawn(Arc::new(FailingQueue), 4);
        publisher.emit(event("b-1")).unwrap();
        publisher.emit(event("b-2")).unwrap();
        drop(publisher);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_emit_after_drain_stopped() {
        let (publisher, handle) = EventPublisher::spawn(Arc::new(RecordingQueue::default()), 4);
        handle.abort();
        let _ = handle.await;
        let err = publisher.emit(event("b-1")).unwrap_err();
        assert!(matches!(err, RotatorError::EventQueue(_)));
    }
}
