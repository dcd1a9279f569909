use async_trait::async_trait;
use bytes::Bytes;
use rotator_core::config::EventsConfig;
use rotator_core::error::{RotatorError, RotatorResult};
use rotator_core::types::Event;
use tracing::info;

/// Transport the publisher drains into.
#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn publish(&self, event: &Event) -> RotatorResult<()>;
}

/// Publishes each event as one JSON message on a fixed NATS subject.
pub struct NatsQueue {
    client: async_nats::Client,
    subject: String,
}

impl NatsQueue {
    pub async fn connect(config: &EventsConfig) -> RotatorResult<Self> {
        info!(url = %config.nats_url, subject = %config.subject, "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connect(&config.nats_url)
            .await
            .map_err(|e| RotatorError::EventQueue(format!("connect {}: {e}", config.nats_url)))?;

        info!("NATS connection established");
        Ok(Self::new(client, config.subject.clone()))
    }

    pub fn new(client: async_nats::Client, subject: String) -> Self {
        Self { client, subject }
    }
}

pub(crate) fn encode(event: &Event) -> RotatorResult<Bytes> {
    serde_json::to_vec(event)
        .map(Bytes::from)
        .map_err(|e| RotatorError::EventQueue(format!("encode event: {e}")))
}

#[async_trait]
impl EventQueue for NatsQueue {
    async fn publish(&self, event: &Event) -> RotatorResult<()> {
        let payload = encode(event)?;
        self.client
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|e| RotatorError::EventQueue(format!("publish to {}: {e}", self.subject)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rotator_core::types::{EventType, ScopeKey};

    #[test]
    fn test_encode_is_flat_json() {
        let event = Event::now(EventType::Click, &ScopeKey::new("s-1", "g-1"), "b-9");
        let payload = encode(&event).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["event_type"], "click");
        assert_eq!(value["slot_id"], "s-1");
        assert_eq!(value["banner_id"], "b-9");
        assert_eq!(value["social_group_id"], "g-1");
        assert!(value["timestamp_micros"].as_i64().unwrap() > 0);
    }
}
