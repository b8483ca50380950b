//! Verification fanout
//!
//! Issues the five provider checks concurrently and joins them. Never fails:
//! each provider failure is converted to its fail-closed signal by the
//! provider's guard.

mod circuit_breaker;
mod guard;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use guard::{GuardConfig, ProviderGuard};

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{SignalKind, SignalSet};
use crate::providers::{AmlProvider, AnomalyScorer, KycProvider, SanctionsProvider, WhitelistProvider};

/// The five collaborators the fanout calls
#[derive(Clone)]
pub struct Providers {
    pub kyc: Arc<dyn KycProvider>,
    pub aml: Arc<dyn AmlProvider>,
    pub sanctions: Arc<dyn SanctionsProvider>,
    pub whitelist: Arc<dyn WhitelistProvider>,
    pub anomaly: Arc<dyn AnomalyScorer>,
}

/// Circuit state of one provider, for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider: SignalKind,
    pub circuit: CircuitState,
}

/// Concurrent, guarded verification of a transfer
pub struct VerificationFanout {
    providers: Providers,
    kyc: ProviderGuard,
    aml: ProviderGuard,
    sanctions: ProviderGuard,
    whitelist: ProviderGuard,
    anomaly: ProviderGuard,
}

impl VerificationFanout {
    /// Every provider gets its own guard built from the same settings
    pub fn new(providers: Providers, config: GuardConfig) -> Self {
        Self {
            providers,
            kyc: ProviderGuard::new(SignalKind::Kyc.as_str(), config.clone()),
            aml: ProviderGuard::new(SignalKind::Aml.as_str(), config.clone()),
            sanctions: ProviderGuard::new(SignalKind::Sanctions.as_str(), config.clone()),
            whitelist: ProviderGuard::new(SignalKind::Whitelist.as_str(), config.clone()),
            anomaly: ProviderGuard::new(SignalKind::Anomaly.as_str(), config),
        }
    }

    /// Gather all five signals. Returns only once every check has resolved,
    /// either with an answer or with its fallback.
    pub async fn gather(&self, from: &str, to: &str, amount: Decimal) -> SignalSet {
        let p = &self.providers;

        let (kyc, aml, sanctions, whitelist, anomaly) = tokio::join!(
            self.kyc.call(|| p.kyc.verify(from, to)),
            self.aml.call(|| p.aml.screen(from, to)),
            self.sanctions.call(|| p.sanctions.check(from, to)),
            self.whitelist.call(|| p.whitelist.check(from, to)),
            self.anomaly.call(|| p.anomaly.score(from, amount)),
        );

        let signals = SignalSet {
            kyc,
            aml,
            sanctions,
            whitelist,
            anomaly,
        };

        let degraded = signals.degraded();
        if !degraded.is_empty() {
            tracing::warn!(degraded = ?degraded, "Verification completed with fallback signals");
        }

        signals
    }

    /// Circuit state per provider
    pub fn health(&self) -> Vec<ProviderHealth> {
        [
            (SignalKind::Kyc, &self.kyc),
            (SignalKind::Aml, &self.aml),
            (SignalKind::Sanctions, &self.sanctions),
            (SignalKind::Whitelist, &self.whitelist),
            (SignalKind::Anomaly, &self.anomaly),
        ]
        .into_iter()
        .map(|(provider, guard)| ProviderHealth {
            provider,
            circuit: guard.circuit_state(),
        })
        .collect()
    }
}
