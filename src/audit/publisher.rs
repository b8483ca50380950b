//! Event publication
//!
//! The recorder hands persisted outbox events to an `EventPublisher`.
//! Delivery is at-least-once; consumers dedupe on the event id.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::record::OutboxEvent;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublicationError {
    #[error("Publication timed out")]
    Timeout,

    #[error("Publication failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublicationError>;
}

/// In-process bus; every subscriber sees every event
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<OutboxEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboxEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublicationError> {
        self.sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| PublicationError::Failed("no active subscribers".to_string()))
    }
}
