//! Audit trail
//!
//! Every decision is written as a hash-chained audit record together with
//! its outbox events. Once the write commits the caller is released and the
//! events are published from a background task; any that fail to go out
//! stay pending for the outbox relay.

mod chain;
mod postgres;
mod publisher;
mod record;
mod store;

pub use chain::{record_hash, verify_chain, ChainVerificationResult, GENESIS_HASH};
pub use postgres::PgAuditStore;
pub use publisher::{BroadcastEventPublisher, EventPublisher, PublicationError};
pub use record::{AuditRecord, OutboxEvent, OutboxStatus};
pub use store::{AuditStore, InMemoryAuditStore, PersistenceError};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{ComplianceDecision, ComplianceEvent};
use crate::fingerprint::CanonicalTransfer;

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Bound on a single publish call
    pub publish_timeout: Duration,
    /// Failed deliveries before an event is dead-lettered
    pub max_attempts: i32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_millis(200),
            max_attempts: 10,
        }
    }
}

/// Outcome of one relay pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// Persists decisions and publishes their events
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    publisher: Arc<dyn EventPublisher>,
    config: RecorderConfig,
}

impl AuditRecorder {
    pub fn new(
        store: Arc<dyn AuditStore>,
        publisher: Arc<dyn EventPublisher>,
        config: RecorderConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Persist the decision with its events and hand them to publication.
    ///
    /// Returns as soon as the record is durable. Publication happens on a
    /// spawned task and never delays or fails the call.
    pub async fn record(
        &self,
        decision: &ComplianceDecision,
        transfer: &CanonicalTransfer,
    ) -> Result<AuditRecord, PersistenceError> {
        let record = AuditRecord::new(decision, transfer);
        let events = ComplianceEvent::for_decision(decision)
            .iter()
            .map(OutboxEvent::new)
            .collect::<Result<Vec<_>, _>>()?;

        let stored = self.store.insert(&record, &events).await?;

        tracing::info!(
            check_id = %stored.check_id,
            status = %stored.status,
            risk_score = stored.risk_score,
            sequence_number = stored.sequence_number,
            "Compliance decision recorded"
        );

        self.spawn_delivery(events);

        Ok(stored)
    }

    /// First delivery attempt for freshly committed events, in order
    fn spawn_delivery(&self, events: Vec<OutboxEvent>) {
        let recorder = self.clone();
        tokio::spawn(async move {
            for event in &events {
                if let Err(e) = recorder.deliver(event).await {
                    tracing::warn!(
                        event_id = %event.id,
                        topic = %event.topic,
                        error = %e,
                        "Event left pending for outbox relay"
                    );
                }
            }
        });
    }

    /// Retry every pending event once
    pub async fn relay_pending(&self, limit: i64) -> Result<RelayReport, PersistenceError> {
        let pending = self.store.pending_events(limit).await?;
        let mut report = RelayReport::default();

        for event in &pending {
            match self.deliver(event).await {
                Ok(()) => report.published += 1,
                Err(DeliveryError::DeadLettered) => report.dead_lettered += 1,
                Err(DeliveryError::Publication(_)) => report.failed += 1,
                Err(DeliveryError::Store(e)) => return Err(e),
            }
        }

        if report != RelayReport::default() {
            tracing::info!(
                published = report.published,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                "Outbox relay pass complete"
            );
        }

        Ok(report)
    }

    pub async fn get(&self, check_id: Uuid) -> Result<Option<AuditRecord>, PersistenceError> {
        self.store.get(check_id).await
    }

    /// Verify the first `limit` records of the hash chain
    pub async fn verify_chain(&self, limit: i64) -> Result<ChainVerificationResult, PersistenceError> {
        let records = self.store.records(limit).await?;
        let result = verify_chain(&records);
        if !result.is_valid {
            tracing::error!(
                first_invalid_entry = ?result.first_invalid_entry,
                "Audit hash chain verification failed"
            );
        }
        Ok(result)
    }

    async fn deliver(&self, event: &OutboxEvent) -> Result<(), DeliveryError> {
        let outcome =
            match tokio::time::timeout(self.config.publish_timeout, self.publisher.publish(event))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(PublicationError::Timeout),
            };

        match outcome {
            Ok(()) => {
                self.store
                    .mark_published(event.id)
                    .await
                    .map_err(DeliveryError::Store)?;
                Ok(())
            }
            Err(e) => {
                let status = self
                    .store
                    .mark_failed(event.id, &e.to_string(), self.config.max_attempts)
                    .await
                    .map_err(DeliveryError::Store)?;
                if status == OutboxStatus::DeadLetter {
                    tracing::error!(
                        event_id = %event.id,
                        check_id = %event.check_id,
                        topic = %event.topic,
                        "Event dead-lettered after {} attempts",
                        self.config.max_attempts
                    );
                    return Err(DeliveryError::DeadLettered);
                }
                Err(DeliveryError::Publication(e))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum DeliveryError {
    #[error(transparent)]
    Publication(PublicationError),

    #[error("Event dead-lettered")]
    DeadLettered,

    #[error(transparent)]
    Store(PersistenceError),
}
