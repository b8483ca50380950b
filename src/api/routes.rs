//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::audit::AuditRecord;
use crate::domain::{ComplianceError, DecisionSummary, TransferCheckRequest};
use crate::error::AppError;
use crate::fanout::ProviderHealth;

use super::AppState;

// =========================================================================
// Response types
// =========================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub providers: Vec<ProviderHealth>,
    pub cached_decisions: usize,
    pub in_flight: usize,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/compliance/checks", post(check_transfer))
        .route("/compliance/checks/:check_id", get(get_check))
}

// =========================================================================
// POST /compliance/checks
// =========================================================================

/// Decide on a proposed transfer. Provenance of the signals is kept in the
/// audit record only.
async fn check_transfer(
    State(state): State<AppState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<DecisionSummary>, AppError> {
    let Json(body) = payload?;
    let request = TransferCheckRequest::from_json(body).map_err(ComplianceError::from)?;
    let decision = state.engine.check_transfer_compliance(request).await?;
    Ok(Json(decision.summary()))
}

// =========================================================================
// GET /compliance/checks/:check_id
// =========================================================================

/// Full audit record of a decision
async fn get_check(
    State(state): State<AppState>,
    Path(check_id): Path<Uuid>,
) -> Result<Json<AuditRecord>, AppError> {
    let record = state
        .engine
        .audit_record(check_id)
        .await?
        .ok_or_else(|| AppError::CheckNotFound(check_id.to_string()))?;

    Ok(Json(record))
}

// =========================================================================
// GET /health
// =========================================================================

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let coordinator = state.engine.coordinator();
    Json(HealthResponse {
        status: "ok",
        providers: state.engine.provider_health(),
        cached_decisions: coordinator.cached_len(),
        in_flight: coordinator.in_flight_len(),
    })
}

#[cfg(test)]
mod tests {
    use crate::domain::{BlockchainType, TransferCheckRequest};

    #[test]
    fn test_check_request_deserialize() {
        let json = r#"{
            "from_address": "0xAbC",
            "to_address": "0xdef",
            "amount": "250.00",
            "token_id": "USDC",
            "blockchain_type": "permissioned",
            "requester_id": "desk-1"
        }"#;

        let request: TransferCheckRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.amount, "250.00");
        assert_eq!(request.blockchain_type, BlockchainType::Permissioned);
    }
}
