//! Simulated providers
//!
//! In-process stand-ins for local runs and load testing. Latency and
//! failures are injected randomly; answers are derived from the addresses
//! so that the same transfer always gets the same verdict.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::{
    AmlProvider, AnomalyScorer, KycProvider, ProviderError, ProviderResult, SanctionsProvider,
    WhitelistProvider,
};
use crate::domain::{AmlResult, AnomalyResult, KycResult, SanctionsResult, WhitelistResult};

/// Addresses with this prefix are treated as high risk by every provider
pub const HIGH_RISK_PREFIX: &str = "0xbad";

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub min_latency: Duration,
    pub max_latency: Duration,
    /// Probability in [0, 1] of answering Unavailable
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_millis(5),
            max_latency: Duration::from_millis(40),
            failure_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedProvider {
    config: SimulationConfig,
}

impl SimulatedProvider {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    async fn respond(&self) -> ProviderResult<()> {
        let (delay, fail) = {
            let mut rng = rand::thread_rng();
            let min = self.config.min_latency.as_millis() as u64;
            let max = (self.config.max_latency.as_millis() as u64).max(min);
            let delay = Duration::from_millis(rng.gen_range(min..=max));
            let fail = rng.gen_bool(self.config.failure_rate.clamp(0.0, 1.0));
            (delay, fail)
        };

        tokio::time::sleep(delay).await;

        if fail {
            return Err(ProviderError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

fn risky(address: &str) -> bool {
    address.starts_with(HIGH_RISK_PREFIX)
}

#[async_trait]
impl KycProvider for SimulatedProvider {
    async fn verify(&self, from: &str, to: &str) -> ProviderResult<KycResult> {
        self.respond().await?;
        let verified = !risky(from) && !risky(to);
        Ok(KycResult {
            verified,
            confidence: if verified { 0.95 } else { 0.4 },
        })
    }
}

#[async_trait]
impl AmlProvider for SimulatedProvider {
    async fn screen(&self, from: &str, to: &str) -> ProviderResult<AmlResult> {
        self.respond().await?;
        if risky(from) || risky(to) {
            Ok(AmlResult::flagged(["structuring"]))
        } else {
            Ok(AmlResult::clean())
        }
    }
}

#[async_trait]
impl SanctionsProvider for SimulatedProvider {
    async fn check(&self, _from: &str, to: &str) -> ProviderResult<SanctionsResult> {
        self.respond().await?;
        Ok(SanctionsResult {
            flagged: risky(to),
        })
    }
}

#[async_trait]
impl WhitelistProvider for SimulatedProvider {
    async fn check(&self, from: &str, to: &str) -> ProviderResult<WhitelistResult> {
        self.respond().await?;
        Ok(WhitelistResult {
            verified: !risky(from) && !risky(to),
        })
    }
}

#[async_trait]
impl AnomalyScorer for SimulatedProvider {
    async fn score(&self, address: &str, amount: Decimal) -> ProviderResult<AnomalyResult> {
        self.respond().await?;
        if risky(address) {
            return Ok(AnomalyResult { score: 0.9 });
        }
        // Larger transfers look slightly more unusual
        let magnitude = amount.to_f64().unwrap_or(f64::MAX).max(1.0).log10();
        Ok(AnomalyResult {
            score: (magnitude / 20.0).clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn instant() -> SimulatedProvider {
        SimulatedProvider::new(SimulationConfig {
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            failure_rate: 0.0,
        })
    }

    #[tokio::test]
    async fn test_clean_addresses_pass() {
        let p = instant();
        assert!(KycProvider::verify(&p, "0xaaa", "0xbbb").await.unwrap().verified);
        assert!(AmlProvider::screen(&p, "0xaaa", "0xbbb").await.unwrap().flags.is_empty());
        assert!(!SanctionsProvider::check(&p, "0xaaa", "0xbbb").await.unwrap().flagged);
        assert!(WhitelistProvider::check(&p, "0xaaa", "0xbbb").await.unwrap().verified);
        let score = AnomalyScorer::score(&p, "0xaaa", dec!(100)).await.unwrap().score;
        assert!(score < 0.2);
    }

    #[tokio::test]
    async fn test_high_risk_prefix_flags() {
        let p = instant();
        assert!(SanctionsProvider::check(&p, "0xaaa", "0xbad1").await.unwrap().flagged);
        assert!(!KycProvider::verify(&p, "0xbad1", "0xbbb").await.unwrap().verified);
    }

    #[tokio::test]
    async fn test_failure_rate_one_always_fails() {
        let p = SimulatedProvider::new(SimulationConfig {
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            failure_rate: 1.0,
        });
        let err = KycProvider::verify(&p, "0xaaa", "0xbbb").await.unwrap_err();
        assert!(err.is_transient());
    }
}
