//! Domain Events
//!
//! Facts emitted downstream once a decision has been durably recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::{ComplianceDecision, DecisionStatus};

pub const TOPIC_CHECK_COMPLETED: &str = "transfer_check_completed";
pub const TOPIC_SAR_REVIEW: &str = "sar_review_required";

/// Compliance events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ComplianceEvent {
    /// A decision was recorded
    TransferCheckCompleted {
        check_id: Uuid,
        status: DecisionStatus,
        risk_score: u8,
        occurred_at: DateTime<Utc>,
    },

    /// A rejected transfer needs suspicious-activity review
    SarReviewRequired {
        check_id: Uuid,
        risk_score: u8,
        reasons: Vec<String>,
        occurred_at: DateTime<Utc>,
    },
}

impl ComplianceEvent {
    /// Events to emit for a freshly recorded decision
    pub fn for_decision(decision: &ComplianceDecision) -> Vec<ComplianceEvent> {
        let occurred_at = decision.created_at;
        let mut events = vec![ComplianceEvent::TransferCheckCompleted {
            check_id: decision.check_id,
            status: decision.status,
            risk_score: decision.risk_score,
            occurred_at,
        }];

        if decision.status == DecisionStatus::Rejected {
            events.push(ComplianceEvent::SarReviewRequired {
                check_id: decision.check_id,
                risk_score: decision.risk_score,
                reasons: decision.reasoning.clone(),
                occurred_at,
            });
        }

        events
    }

    /// Topic the event is published on
    pub fn topic(&self) -> &'static str {
        match self {
            ComplianceEvent::TransferCheckCompleted { .. } => TOPIC_CHECK_COMPLETED,
            ComplianceEvent::SarReviewRequired { .. } => TOPIC_SAR_REVIEW,
        }
    }

    pub fn check_id(&self) -> Uuid {
        match self {
            ComplianceEvent::TransferCheckCompleted { check_id, .. } => *check_id,
            ComplianceEvent::SarReviewRequired { check_id, .. } => *check_id,
        }
    }
}
