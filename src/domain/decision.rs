//! Compliance decision
//!
//! The single, immutable outcome of evaluating a transfer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signals::SignalSet;

/// Decision states, from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Approved,
    Escalated,
    Rejected,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Approved => "APPROVED",
            DecisionStatus::Escalated => "ESCALATED",
            DecisionStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DecisionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROVED" => Ok(DecisionStatus::Approved),
            "ESCALATED" => Ok(DecisionStatus::Escalated),
            "REJECTED" => Ok(DecisionStatus::Rejected),
            other => Err(format!("unknown decision status: {}", other)),
        }
    }
}

/// Full decision, as recorded in the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceDecision {
    pub check_id: Uuid,
    pub fingerprint: String,
    pub status: DecisionStatus,
    /// Integer in [0, 100]
    pub risk_score: u8,
    /// Triggered reasons in evaluation order
    pub reasoning: Vec<String>,
    pub signals: SignalSet,
    pub created_at: DateTime<Utc>,
}

impl ComplianceDecision {
    /// Caller-facing view without signal provenance
    pub fn summary(&self) -> DecisionSummary {
        DecisionSummary {
            check_id: self.check_id,
            status: self.status,
            risk_score: self.risk_score,
            reasoning: self.reasoning.clone(),
            created_at: self.created_at,
        }
    }
}

/// What a caller sees for a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub check_id: Uuid,
    pub status: DecisionStatus,
    pub risk_score: u8,
    pub reasoning: Vec<String>,
    pub created_at: DateTime<Utc>,
}
