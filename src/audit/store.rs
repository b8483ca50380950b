//! Audit store
//!
//! Durable storage for audit records and their outbox events. `insert`
//! writes a record and its events atomically, which is what lets the
//! recorder treat "persisted" and "queued for publication" as one step.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::chain::{record_hash, GENESIS_HASH};
use super::record::{AuditRecord, OutboxEvent, OutboxStatus};

/// Audit store errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Check already recorded: {0}")]
    Duplicate(Uuid),

    #[error("Outbox event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("Audit store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a record and its outbox events in one atomic write.
    /// Returns the stored record with sequence and chain hashes filled in.
    async fn insert(
        &self,
        record: &AuditRecord,
        events: &[OutboxEvent],
    ) -> Result<AuditRecord, PersistenceError>;

    async fn get(&self, check_id: Uuid) -> Result<Option<AuditRecord>, PersistenceError>;

    /// First `limit` records in chain order
    async fn records(&self, limit: i64) -> Result<Vec<AuditRecord>, PersistenceError>;

    /// Oldest pending outbox events
    async fn pending_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, PersistenceError>;

    async fn mark_published(&self, event_id: Uuid) -> Result<(), PersistenceError>;

    /// Count a failed delivery; the event is dead-lettered once `attempts`
    /// reaches `max_attempts`. Returns the resulting status.
    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        max_attempts: i32,
    ) -> Result<OutboxStatus, PersistenceError>;
}

#[derive(Debug, Default)]
struct InMemoryState {
    records: Vec<AuditRecord>,
    outbox: Vec<OutboxEvent>,
}

/// Process-local store, for development and tests
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, PersistenceError> {
        self.state
            .lock()
            .map_err(|_| PersistenceError::Unavailable("audit store lock poisoned".to_string()))
    }

    /// Every outbox event regardless of status
    pub fn outbox(&self) -> Vec<OutboxEvent> {
        self.lock().map(|s| s.outbox.clone()).unwrap_or_default()
    }

    pub fn record_count(&self) -> usize {
        self.lock().map(|s| s.records.len()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(
        &self,
        record: &AuditRecord,
        events: &[OutboxEvent],
    ) -> Result<AuditRecord, PersistenceError> {
        let mut state = self.lock()?;

        if state.records.iter().any(|r| r.check_id == record.check_id) {
            return Err(PersistenceError::Duplicate(record.check_id));
        }

        let previous_hash = state
            .records
            .last()
            .map(|r| r.record_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let mut stored = record.clone();
        stored.sequence_number = state.records.len() as i64 + 1;
        stored.record_hash = record_hash(&stored, &previous_hash)?;
        stored.previous_hash = previous_hash;

        state.records.push(stored.clone());
        state.outbox.extend(events.iter().cloned());

        Ok(stored)
    }

    async fn get(&self, check_id: Uuid) -> Result<Option<AuditRecord>, PersistenceError> {
        let state = self.lock()?;
        Ok(state.records.iter().find(|r| r.check_id == check_id).cloned())
    }

    async fn records(&self, limit: i64) -> Result<Vec<AuditRecord>, PersistenceError> {
        let state = self.lock()?;
        Ok(state
            .records
            .iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn pending_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, PersistenceError> {
        let state = self.lock()?;
        Ok(state
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, event_id: Uuid) -> Result<(), PersistenceError> {
        let mut state = self.lock()?;
        let event = state
            .outbox
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(PersistenceError::EventNotFound(event_id))?;
        event.status = OutboxStatus::Published;
        event.last_error = None;
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        max_attempts: i32,
    ) -> Result<OutboxStatus, PersistenceError> {
        let mut state = self.lock()?;
        let event = state
            .outbox
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(PersistenceError::EventNotFound(event_id))?;
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        if event.attempts >= max_attempts {
            event.status = OutboxStatus::DeadLetter;
        }
        Ok(event.status)
    }
}
