//! Per-provider circuit breaker
//!
//! ```text
//!   CLOSED --(failure_threshold consecutive failures)--> OPEN
//!   OPEN   --(open_timeout elapsed, one probe allowed)--> HALF-OPEN
//!   HALF-OPEN --(success_threshold successes)--> CLOSED
//!   HALF-OPEN --(any failure)--> OPEN
//! ```
//!
//! While open, callers short-circuit straight to the fallback signal.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Calls are short-circuited
    Open,
    /// Probing whether the provider recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Successes in half-open state before closing
    pub success_threshold: u32,
    /// Cool-down before a probe is allowed
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Breaker guarding a single provider
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitInner> {
        // State stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state, without triggering transitions
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Check whether a call may proceed. Every `true` must be followed by
    /// exactly one `record_success` or `record_failure`.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.open_timeout);
                if cooled_down {
                    info!(provider = self.name, "Circuit breaker transitioning to half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.probe_in_flight = true;
                    true
                } else {
                    debug!(provider = self.name, "Circuit breaker is open, short-circuiting");
                    false
                }
            }
            CircuitState::HalfOpen => {
                // One probe at a time
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a call that reached the provider and got an answer
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    info!(
                        provider = self.name,
                        successes = inner.half_open_successes,
                        "Circuit breaker closing after successful probes"
                    );
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a timeout or transport failure
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        provider = self.name,
                        failures = inner.consecutive_failures,
                        cool_down_secs = self.config.open_timeout.as_secs(),
                        "Circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(provider = self.name, "Probe failed, circuit breaker re-opening");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                inner.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }
}
