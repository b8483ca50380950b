//! Domain Error Types
//!
//! Caller-visible failures of the compliance core. Provider failures never
//! appear here: they are absorbed into fail-closed signals.

use thiserror::Error;

/// Malformed request, detected before any provider is called
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid field '{field}': {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::new(field, "is required")
    }
}

/// Errors returned by `CheckTransferCompliance`
///
/// Cloneable so that every coalesced waiter receives the same outcome.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComplianceError {
    /// Malformed input
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The decision could not be durably recorded; the caller may retry
    #[error("Decision could not be persisted: {0}")]
    Persistence(String),

    /// The shared computation ended without producing a result
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ComplianceError {
    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if retrying the same request may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field() {
        let err: ComplianceError = ValidationError::missing("amount").into();
        assert!(err.is_client_error());
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_persistence_error_is_retriable() {
        let err = ComplianceError::Persistence("connection reset".to_string());
        assert!(err.is_retriable());
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("connection reset"));
    }
}
