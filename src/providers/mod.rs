//! Verification providers
//!
//! Outbound interfaces to the identity and risk services. Each one is an
//! independently swappable trait object; failures are typed so the fanout
//! can apply its fallback policy uniformly.

pub mod http;
pub mod simulated;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{AmlResult, AnomalyResult, KycResult, SanctionsResult, WhitelistResult};

/// Typed provider failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider timed out")]
    Timeout,

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider rejected the request: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Transient network failure, worth one retry
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[async_trait]
pub trait KycProvider: Send + Sync {
    async fn verify(&self, from: &str, to: &str) -> ProviderResult<KycResult>;
}

#[async_trait]
pub trait AmlProvider: Send + Sync {
    async fn screen(&self, from: &str, to: &str) -> ProviderResult<AmlResult>;
}

#[async_trait]
pub trait SanctionsProvider: Send + Sync {
    async fn check(&self, from: &str, to: &str) -> ProviderResult<SanctionsResult>;
}

#[async_trait]
pub trait WhitelistProvider: Send + Sync {
    async fn check(&self, from: &str, to: &str) -> ProviderResult<WhitelistResult>;
}

#[async_trait]
pub trait AnomalyScorer: Send + Sync {
    async fn score(&self, address: &str, amount: Decimal) -> ProviderResult<AnomalyResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(ProviderError::Unavailable("reset".into()).is_transient());
        assert!(!ProviderError::Timeout.is_transient());
        assert!(!ProviderError::Rejected("bad address".into()).is_transient());
    }
}
