//! Audit records and outbox events
//!
//! The durable shape of a decision, and the events queued alongside it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{BlockchainType, ComplianceDecision, ComplianceEvent, DecisionStatus, SignalSet};
use crate::fingerprint::CanonicalTransfer;

/// Decision plus the transfer it was made for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Persisted record id
    pub id: Uuid,
    /// Position in the hash chain, assigned by the store
    pub sequence_number: i64,
    pub check_id: Uuid,
    pub fingerprint: String,
    pub requester_id: String,
    pub blockchain_type: BlockchainType,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub token_id: String,
    pub status: DecisionStatus,
    pub risk_score: u8,
    pub reasoning: Vec<String>,
    /// All five signals including provenance
    pub signals: SignalSet,
    pub created_at: DateTime<Utc>,
    /// Assigned by the store
    pub previous_hash: String,
    /// Assigned by the store
    pub record_hash: String,
}

impl AuditRecord {
    /// Build an unpersisted record; chain fields are filled in by the store
    pub fn new(decision: &ComplianceDecision, transfer: &CanonicalTransfer) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence_number: 0,
            check_id: decision.check_id,
            fingerprint: decision.fingerprint.clone(),
            requester_id: transfer.requester_id.clone(),
            blockchain_type: transfer.blockchain_type,
            from_address: transfer.from_address.clone(),
            to_address: transfer.to_address.clone(),
            amount: transfer.amount.value(),
            token_id: transfer.token_id.clone(),
            status: decision.status,
            risk_score: decision.risk_score,
            reasoning: decision.reasoning.clone(),
            signals: decision.signals.clone(),
            created_at: decision.created_at,
            previous_hash: String::new(),
            record_hash: String::new(),
        }
    }

    /// Rebuild the decision this record was written for
    pub fn decision(&self) -> ComplianceDecision {
        ComplianceDecision {
            check_id: self.check_id,
            fingerprint: self.fingerprint.clone(),
            status: self.status,
            risk_score: self.risk_score,
            reasoning: self.reasoning.clone(),
            signals: self.signals.clone(),
            created_at: self.created_at,
        }
    }
}

/// Delivery state of an outbox event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Published,
    DeadLetter,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Published => "published",
            OutboxStatus::DeadLetter => "dead_letter",
        }
    }
}

impl From<String> for OutboxStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "published" => OutboxStatus::Published,
            "dead_letter" => OutboxStatus::DeadLetter,
            _ => OutboxStatus::Pending,
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event persisted with its decision, delivered at least once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Stable id, lets consumers drop redeliveries
    pub id: Uuid,
    pub check_id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    pub fn new(event: &ComplianceEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            check_id: event.check_id(),
            topic: event.topic().to_string(),
            payload: serde_json::to_value(event)?,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        })
    }
}
