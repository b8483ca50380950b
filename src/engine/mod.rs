//! Compliance engine
//!
//! Composition root of the decision pipeline:
//! fingerprint -> coordinator -> fanout -> score -> decide -> record.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditRecorder, PersistenceError};
use crate::domain::{ComplianceDecision, ComplianceError, TransferCheckRequest};
use crate::fanout::{ProviderHealth, VerificationFanout};
use crate::fingerprint::{CanonicalTransfer, RequestFingerprinter};
use crate::idempotency::IdempotencyCoordinator;
use crate::risk;

#[derive(Clone)]
pub struct ComplianceEngine {
    fingerprinter: RequestFingerprinter,
    coordinator: IdempotencyCoordinator,
    fanout: Arc<VerificationFanout>,
    recorder: Arc<AuditRecorder>,
}

impl ComplianceEngine {
    pub fn new(
        coordinator: IdempotencyCoordinator,
        fanout: Arc<VerificationFanout>,
        recorder: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            fingerprinter: RequestFingerprinter::new(),
            coordinator,
            fanout,
            recorder,
        }
    }

    /// Decide on a proposed transfer.
    ///
    /// Identical transfers within the cache window share one decision,
    /// whoever requested them. A decision is only returned once it has been
    /// durably recorded.
    pub async fn check_transfer_compliance(
        &self,
        request: TransferCheckRequest,
    ) -> Result<Arc<ComplianceDecision>, ComplianceError> {
        let transfer = self.fingerprinter.canonicalize(&request)?;
        let fingerprint = transfer.fingerprint.clone();

        let fanout = self.fanout.clone();
        let recorder = self.recorder.clone();

        self.coordinator
            .evaluate(fingerprint, move || decide_and_record(transfer, fanout, recorder))
            .await
    }

    /// Audit record of an earlier decision
    pub async fn audit_record(&self, check_id: Uuid) -> Result<Option<AuditRecord>, PersistenceError> {
        self.recorder.get(check_id).await
    }

    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.fanout.health()
    }

    pub fn coordinator(&self) -> &IdempotencyCoordinator {
        &self.coordinator
    }

    pub fn recorder(&self) -> &AuditRecorder {
        &self.recorder
    }
}

async fn decide_and_record(
    transfer: CanonicalTransfer,
    fanout: Arc<VerificationFanout>,
    recorder: Arc<AuditRecorder>,
) -> Result<ComplianceDecision, ComplianceError> {
    let signals = fanout
        .gather(&transfer.from_address, &transfer.to_address, transfer.amount.value())
        .await;

    let assessment = risk::score(&signals);
    let status = risk::decide(assessment.risk_score);

    let decision = ComplianceDecision {
        check_id: Uuid::new_v4(),
        fingerprint: transfer.fingerprint.to_string(),
        status,
        risk_score: assessment.risk_score,
        reasoning: assessment.reasoning,
        signals,
        created_at: Utc::now(),
    };

    recorder.record(&decision, &transfer).await.map_err(|e| {
        tracing::error!(
            check_id = %decision.check_id,
            fingerprint = %transfer.fingerprint,
            error = %e,
            "Failed to persist compliance decision"
        );
        ComplianceError::Persistence(e.to_string())
    })?;

    Ok(decision)
}
