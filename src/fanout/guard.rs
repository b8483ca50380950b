//! Provider call guard
//!
//! Wraps every call to one provider with a concurrency limit, a deadline
//! covering the attempt and its retry, a single retry on transient errors,
//! and a circuit breaker. The outcome is always a signal: failures become
//! the payload's fail-closed fallback.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::domain::{Provenance, Signal, SignalPayload};
use crate::providers::{ProviderError, ProviderResult};

/// Per-provider resilience settings
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Deadline for the attempt plus its retry
    pub call_timeout: Duration,
    /// Base delay before the retry; up to half of it is added as jitter
    pub retry_backoff: Duration,
    /// Concurrent in-flight calls allowed
    pub max_concurrency: usize,
    /// How long to wait for a concurrency slot before failing fast
    pub queue_timeout: Duration,
    pub circuit: CircuitBreakerConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(150),
            retry_backoff: Duration::from_millis(20),
            max_concurrency: 64,
            queue_timeout: Duration::from_millis(10),
            circuit: CircuitBreakerConfig::default(),
        }
    }
}

/// Guard around a single provider
#[derive(Debug)]
pub struct ProviderGuard {
    name: &'static str,
    limiter: Arc<Semaphore>,
    breaker: CircuitBreaker,
    config: GuardConfig,
}

impl ProviderGuard {
    pub fn new(name: &'static str, config: GuardConfig) -> Self {
        Self {
            name,
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            breaker: CircuitBreaker::new(name, config.circuit.clone()),
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `op` under the guard. `op` is invoked at most twice.
    pub async fn call<T, F, Fut>(&self, op: F) -> Signal<T>
    where
        T: SignalPayload,
        F: Fn() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let _permit = match tokio::time::timeout(
            self.config.queue_timeout,
            self.limiter.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                warn!(provider = self.name, "Provider saturated, using fallback");
                return Signal::fallback(Provenance::Unavailable);
            }
        };

        if !self.breaker.try_acquire() {
            return Signal::fallback(Provenance::Unavailable);
        }

        let outcome = tokio::time::timeout(self.config.call_timeout, self.attempt(&op)).await;

        match outcome {
            Ok(Ok(value)) => {
                self.breaker.record_success();
                Signal::ok(value)
            }
            Ok(Err(ProviderError::Rejected(reason))) => {
                // The provider answered, so it is healthy
                self.breaker.record_success();
                warn!(provider = self.name, reason = %reason, "Provider rejected request, using fallback");
                Signal::fallback(Provenance::Unavailable)
            }
            Ok(Err(ProviderError::Timeout)) => {
                self.breaker.record_failure();
                warn!(provider = self.name, "Provider timed out, using fallback");
                Signal::fallback(Provenance::Timeout)
            }
            Ok(Err(ProviderError::Unavailable(reason))) => {
                self.breaker.record_failure();
                warn!(provider = self.name, reason = %reason, "Provider unavailable, using fallback");
                Signal::fallback(Provenance::Unavailable)
            }
            Err(_) => {
                self.breaker.record_failure();
                warn!(
                    provider = self.name,
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "Provider call exceeded deadline, using fallback"
                );
                Signal::fallback(Provenance::Timeout)
            }
        }
    }

    async fn attempt<T, F, Fut>(&self, op: &F) -> ProviderResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        match op().await {
            Err(e) if e.is_transient() => {
                let delay = self.retry_delay();
                debug!(
                    provider = self.name,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Transient provider error, retrying once"
                );
                tokio::time::sleep(delay).await;
                op().await
            }
            other => other,
        }
    }

    fn retry_delay(&self) -> Duration {
        let base = self.config.retry_backoff.as_millis() as u64;
        let jitter = if base >= 2 {
            rand::thread_rng().gen_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnomalyResult, WhitelistResult};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn guard() -> ProviderGuard {
        ProviderGuard::new(
            "test",
            GuardConfig {
                call_timeout: Duration::from_millis(100),
                retry_backoff: Duration::from_millis(10),
                max_concurrency: 2,
                queue_timeout: Duration::from_millis(5),
                circuit: CircuitBreakerConfig {
                    failure_threshold: 2,
                    success_threshold: 1,
                    open_timeout: Duration::from_secs(30),
                },
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_passes_through() {
        let g = guard();
        let signal = g
            .call(|| async { Ok(WhitelistResult { verified: true }) })
            .await;
        assert_eq!(signal.provenance, Provenance::Ok);
        assert!(signal.value.verified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_once() {
        let g = guard();
        let calls = AtomicU32::new(0);
        let signal = g
            .call(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ProviderError::Unavailable("reset".into()))
                    } else {
                        Ok(WhitelistResult { verified: true })
                    }
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(signal.provenance, Provenance::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_not_retried() {
        let g = guard();
        let calls = AtomicU32::new(0);
        let signal: Signal<WhitelistResult> = g
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Rejected("unknown address".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(signal.provenance, Provenance::Unavailable);
        assert!(!signal.value.verified);
        assert_eq!(g.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out_to_fallback() {
        let g = guard();
        let signal: Signal<AnomalyResult> = g
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(AnomalyResult { score: 0.0 })
            })
            .await;
        assert_eq!(signal.provenance, Provenance::Timeout);
        assert_eq!(signal.value.score, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_short_circuits() {
        let g = guard();
        for _ in 0..2 {
            let _: Signal<WhitelistResult> = g.call(|| async { Err(ProviderError::Timeout) }).await;
        }
        assert_eq!(g.circuit_state(), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let signal: Signal<WhitelistResult> = g
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(WhitelistResult { verified: true }) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(signal.provenance, Provenance::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_limiter_fails_fast() {
        let g = Arc::new(guard());
        let held: Vec<_> = (0..2)
            .map(|_| g.limiter.clone().try_acquire_owned().unwrap())
            .collect();

        let signal: Signal<WhitelistResult> = g
            .call(|| async { Ok(WhitelistResult { verified: true }) })
            .await;
        assert_eq!(signal.provenance, Provenance::Unavailable);
        drop(held);
    }
}
