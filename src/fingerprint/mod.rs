//! Request fingerprinting
//!
//! Validates an inbound request and derives the canonical key used for
//! idempotency and request coalescing. The key covers only the immutable
//! transfer attributes: `requester_id` and wall-clock time are excluded.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{Amount, AmountError, BlockchainType, TransferCheckRequest, ValidationError};

/// Canonical hex SHA-256 key of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request that passed validation, in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTransfer {
    pub from_address: String,
    pub to_address: String,
    pub amount: Amount,
    pub token_id: String,
    pub blockchain_type: BlockchainType,
    pub requester_id: String,
    pub fingerprint: Fingerprint,
}

/// Stateless validator and key derivation
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestFingerprinter;

impl RequestFingerprinter {
    pub fn new() -> Self {
        Self
    }

    /// Derive the fingerprint of a request
    pub fn fingerprint(&self, request: &TransferCheckRequest) -> Result<Fingerprint, ValidationError> {
        self.canonicalize(request).map(|t| t.fingerprint)
    }

    /// Validate and canonicalize a request. The first offending field is
    /// reported.
    pub fn canonicalize(
        &self,
        request: &TransferCheckRequest,
    ) -> Result<CanonicalTransfer, ValidationError> {
        let from_address = canonical_address("from_address", &request.from_address)?;
        let to_address = canonical_address("to_address", &request.to_address)?;

        let amount = parse_amount(&request.amount)?;

        let token_id = request.token_id.trim();
        if token_id.is_empty() {
            return Err(ValidationError::missing("token_id"));
        }

        let requester_id = request.requester_id.trim();
        if requester_id.is_empty() {
            return Err(ValidationError::missing("requester_id"));
        }

        let fingerprint = compute_fingerprint(&from_address, &to_address, &amount, token_id);

        Ok(CanonicalTransfer {
            from_address,
            to_address,
            amount,
            token_id: token_id.to_string(),
            blockchain_type: request.blockchain_type,
            requester_id: requester_id.to_string(),
            fingerprint,
        })
    }
}

fn canonical_address(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::missing(field));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(ValidationError::new(field, "must not contain whitespace"));
    }
    Ok(trimmed.to_lowercase())
}

fn parse_amount(raw: &str) -> Result<Amount, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::missing("amount"));
    }
    raw.parse::<Amount>().map_err(|e| match e {
        AmountError::ParseError(_) => ValidationError::new("amount", "must be a decimal number"),
        other => ValidationError::new("amount", other.to_string()),
    })
}

fn compute_fingerprint(from: &str, to: &str, amount: &Amount, token_id: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}|{}", from, to, amount.units(), token_id).as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}
