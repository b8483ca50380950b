//! Idempotency Coordinator
//!
//! Per-fingerprint single-flight execution with a time-bounded result cache.
//! Concurrent callers that miss the cache for the same fingerprint share one
//! computation; only successful results are cached.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::{ComplianceDecision, ComplianceError};
use crate::fingerprint::Fingerprint;

/// Shared outcome handed to every waiter
pub type SharedOutcome = Result<Arc<ComplianceDecision>, ComplianceError>;

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a recorded decision is served from cache
    pub ttl: Duration,
    /// Maximum cached decisions
    pub capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            capacity: 10_000,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    decision: Arc<ComplianceDecision>,
    expires_at: Instant,
}

#[derive(Debug)]
struct CoordinatorState {
    cache: LruCache<Fingerprint, CacheEntry>,
    in_flight: HashMap<Fingerprint, watch::Receiver<Option<SharedOutcome>>>,
}

impl CoordinatorState {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            in_flight: HashMap::new(),
        }
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<Fingerprint> = self
            .cache
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(fp, _)| fp.clone())
            .collect();
        for fp in &expired {
            self.cache.pop(fp);
        }
        expired.len()
    }

    /// Fresh cached decision, refreshing its recency
    fn cached(&mut self, fingerprint: &Fingerprint, now: Instant) -> Option<Arc<ComplianceDecision>> {
        let hit = self
            .cache
            .get(fingerprint)
            .map(|entry| (now < entry.expires_at, entry.decision.clone()));
        match hit {
            Some((true, decision)) => Some(decision),
            Some((false, _)) => {
                self.cache.pop(fingerprint);
                None
            }
            None => None,
        }
    }

    /// Evicts the least recently used entry when full
    fn insert(&mut self, fingerprint: Fingerprint, decision: Arc<ComplianceDecision>, ttl: Duration) {
        self.cache.put(
            fingerprint,
            CacheEntry {
                decision,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// Single-flight coordinator keyed by fingerprint
#[derive(Debug, Clone)]
pub struct IdempotencyCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    config: CoordinatorConfig,
}

impl IdempotencyCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CoordinatorState::new(config.capacity))),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        lock_state(&self.state)
    }

    /// Return the cached decision for `fingerprint`, join an in-flight
    /// computation for it, or start `compute` as the single computation.
    ///
    /// The computation runs on its own task: a caller that stops waiting
    /// does not cancel it, and its result still populates the cache.
    pub async fn evaluate<F, Fut>(&self, fingerprint: Fingerprint, compute: F) -> SharedOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ComplianceDecision, ComplianceError>> + Send + 'static,
    {
        let (leader, mut rx) = {
            let mut state = self.lock();

            if let Some(decision) = state.cached(&fingerprint, Instant::now()) {
                debug!(fingerprint = %fingerprint, check_id = %decision.check_id, "Cache hit");
                return Ok(decision);
            }

            if let Some(rx) = state.in_flight.get(&fingerprint).cloned() {
                debug!(fingerprint = %fingerprint, "Joining in-flight computation");
                (None, rx)
            } else {
                // Built before registering: a panicking closure must leave no flight behind
                let computation = compute();
                let (tx, rx) = watch::channel(None);
                state.in_flight.insert(fingerprint.clone(), rx.clone());
                (Some((tx, computation)), rx)
            }
        };

        if let Some((tx, computation)) = leader {
            self.spawn_computation(fingerprint, computation, tx);
        }

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(ComplianceError::Internal(
                "computation ended without a result".to_string(),
            ))
        })
    }

    fn spawn_computation<Fut>(
        &self,
        fingerprint: Fingerprint,
        computation: Fut,
        tx: watch::Sender<Option<SharedOutcome>>,
    ) where
        Fut: Future<Output = Result<ComplianceDecision, ComplianceError>> + Send + 'static,
    {
        let state = self.state.clone();
        let ttl = self.config.ttl;

        tokio::spawn(async move {
            let outcome: SharedOutcome = match tokio::spawn(computation).await {
                Ok(result) => result.map(Arc::new),
                Err(e) => {
                    warn!(fingerprint = %fingerprint, error = %e, "Compliance computation aborted");
                    Err(ComplianceError::Internal(format!("computation aborted: {}", e)))
                }
            };

            {
                let mut state = lock_state(&state);
                state.in_flight.remove(&fingerprint);
                match &outcome {
                    Ok(decision) => state.insert(fingerprint.clone(), decision.clone(), ttl),
                    Err(e) => debug!(fingerprint = %fingerprint, error = %e, "Computation failed, not cached"),
                }
            }

            // No receivers left just means every caller went away
            let _ = tx.send(Some(outcome));
        });
    }

    /// Drop expired cache entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    /// Cached decisions, including not-yet-purged expired ones
    pub fn cached_len(&self) -> usize {
        self.lock().cache.len()
    }

    /// Computations currently running
    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }
}

fn lock_state(state: &Mutex<CoordinatorState>) -> MutexGuard<'_, CoordinatorState> {
    // The critical sections never leave the maps half-updated
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DecisionStatus, SignalSet, TransferCheckRequest};
    use crate::fingerprint::RequestFingerprinter;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn fingerprint(amount: &str) -> Fingerprint {
        RequestFingerprinter::new()
            .fingerprint(&TransferCheckRequest::new("0xa", "0xb", amount, "USDC").with_requester("r"))
            .unwrap()
    }

    fn decision(fp: &Fingerprint) -> ComplianceDecision {
        ComplianceDecision {
            check_id: Uuid::new_v4(),
            fingerprint: fp.to_string(),
            status: DecisionStatus::Approved,
            risk_score: 1,
            reasoning: vec!["All checks passed".to_string()],
            signals: SignalSet::clean(),
            created_at: Utc::now(),
        }
    }

    fn coordinator(ttl_secs: u64, capacity: usize) -> IdempotencyCoordinator {
        IdempotencyCoordinator::new(CoordinatorConfig {
            ttl: Duration::from_secs(ttl_secs),
            capacity,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_computation() {
        let coord = coordinator(300, 100);
        let fp = fingerprint("10");
        let runs = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let coord = coord.clone();
            let fp = fp.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                coord
                    .evaluate(fp.clone(), move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(decision(&fp))
                    })
                    .await
            }));
        }

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap().check_id);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(coord.in_flight_len(), 0);
        assert_eq!(coord.cached_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_then_expiry() {
        let coord = coordinator(300, 100);
        let fp = fingerprint("10");
        let runs = Arc::new(AtomicU32::new(0));

        let run = |runs: Arc<AtomicU32>, fp: Fingerprint| {
            move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(decision(&fp))
            }
        };

        let first = coord.evaluate(fp.clone(), run(runs.clone(), fp.clone())).await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        let second = coord.evaluate(fp.clone(), run(runs.clone(), fp.clone())).await.unwrap();
        assert_eq!(first.check_id, second.check_id);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let third = coord.evaluate(fp.clone(), run(runs.clone(), fp.clone())).await.unwrap();
        assert_ne!(first.check_id, third.check_id);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_shared_but_not_cached() {
        let coord = coordinator(300, 100);
        let fp = fingerprint("10");

        let err = coord
            .evaluate(fp.clone(), || async {
                Err(ComplianceError::Persistence("disk full".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ComplianceError::Persistence(_)));
        assert_eq!(coord.cached_len(), 0);
        assert_eq!(coord.in_flight_len(), 0);

        let ok = coord
            .evaluate(fp.clone(), {
                let fp = fp.clone();
                move || async move { Ok(decision(&fp)) }
            })
            .await;
        assert!(ok.is_ok());
        assert_eq!(coord.cached_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_caller_does_not_cancel_computation() {
        let coord = coordinator(300, 100);
        let fp = fingerprint("10");
        let runs = Arc::new(AtomicU32::new(0));

        let caller = {
            let coord = coord.clone();
            let fp = fp.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                coord
                    .evaluate(fp.clone(), move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(decision(&fp))
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(coord.cached_len(), 1);
        let cached = coord
            .evaluate(fp.clone(), || async {
                Err(ComplianceError::Internal("should not run".to_string()))
            })
            .await;
        assert!(cached.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_computation_releases_slot() {
        let coord = coordinator(300, 100);
        let fp = fingerprint("10");

        async fn exploding() -> Result<ComplianceDecision, ComplianceError> {
            panic!("provider client bug")
        }

        let err = coord.evaluate(fp.clone(), exploding).await.unwrap_err();
        assert!(matches!(err, ComplianceError::Internal(_)));
        assert_eq!(coord.in_flight_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_closure_releases_slot() {
        let coord = coordinator(300, 100);
        let fp = fingerprint("10");

        let caller = {
            let coord = coord.clone();
            let fp = fp.clone();
            tokio::spawn(async move {
                coord
                    .evaluate(fp, || -> std::future::Ready<Result<ComplianceDecision, ComplianceError>> {
                        panic!("request builder bug")
                    })
                    .await
            })
        };
        assert!(caller.await.unwrap_err().is_panic());
        assert_eq!(coord.in_flight_len(), 0);

        let decision = coord
            .evaluate(fp.clone(), {
                let fp = fp.clone();
                move || async move { Ok(decision(&fp)) }
            })
            .await;
        assert!(decision.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_used() {
        let coord = coordinator(300, 2);
        let runs = Arc::new(AtomicU32::new(0));
        let evaluate = |amount: &'static str| {
            let coord = coord.clone();
            let runs = runs.clone();
            async move {
                let fp = fingerprint(amount);
                coord
                    .evaluate(fp.clone(), move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(decision(&fp))
                    })
                    .await
                    .unwrap()
            }
        };

        evaluate("1").await;
        evaluate("2").await;
        // Touch "1" so "2" becomes the eviction candidate
        evaluate("1").await;
        evaluate("3").await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(coord.cached_len(), 2);

        evaluate("1").await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        evaluate("2").await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_stays_bounded_past_capacity() {
        let coord = coordinator(300, 50);
        for i in 1..=500 {
            let fp = fingerprint(&i.to_string());
            coord
                .evaluate(fp.clone(), move || async move { Ok(decision(&fp)) })
                .await
                .unwrap();
        }
        assert_eq!(coord.cached_len(), 50);
        assert_eq!(coord.in_flight_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let coord = coordinator(5, 10);
        let fp = fingerprint("1");
        coord
            .evaluate(fp.clone(), move || async move { Ok(decision(&fp)) })
            .await
            .unwrap();
        assert_eq!(coord.purge_expired(), 0);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(coord.purge_expired(), 1);
        assert_eq!(coord.cached_len(), 0);
    }
}
