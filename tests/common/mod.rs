//! Common test utilities
//!
//! Scripted providers, a store that can be made to fail and a publisher
//! that records what it was given, wired into a full engine.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use transfer_compliance::audit::{
    AuditRecord, AuditRecorder, AuditStore, EventPublisher, InMemoryAuditStore, OutboxEvent,
    OutboxStatus, PersistenceError, PublicationError, RecorderConfig,
};
use transfer_compliance::domain::{
    AmlResult, AnomalyResult, KycResult, SanctionsResult, SignalKind, TransferCheckRequest,
    WhitelistResult,
};
use transfer_compliance::engine::ComplianceEngine;
use transfer_compliance::fanout::{GuardConfig, Providers, VerificationFanout};
use transfer_compliance::idempotency::{CoordinatorConfig, IdempotencyCoordinator};
use transfer_compliance::providers::{
    AmlProvider, AnomalyScorer, KycProvider, ProviderError, ProviderResult, SanctionsProvider,
    WhitelistProvider,
};

// =========================================================================
// Scripted providers
// =========================================================================

/// What each provider answers
#[derive(Debug, Clone)]
pub struct Script {
    pub kyc: ProviderResult<KycResult>,
    pub aml: ProviderResult<AmlResult>,
    pub sanctions: ProviderResult<SanctionsResult>,
    pub whitelist: ProviderResult<WhitelistResult>,
    pub anomaly: ProviderResult<AnomalyResult>,
}

impl Script {
    /// Every check passes, anomaly 0.1 (score 1)
    pub fn low_risk() -> Self {
        Self {
            kyc: Ok(KycResult {
                verified: true,
                confidence: 0.98,
            }),
            aml: Ok(AmlResult::clean()),
            sanctions: Ok(SanctionsResult { flagged: false }),
            whitelist: Ok(WhitelistResult { verified: true }),
            anomaly: Ok(AnomalyResult { score: 0.1 }),
        }
    }

    /// KYC incomplete, otherwise clean (score 31)
    pub fn medium_risk() -> Self {
        Self {
            kyc: Ok(KycResult {
                verified: false,
                confidence: 0.4,
            }),
            ..Self::low_risk()
        }
    }

    /// Everything triggers, anomaly 0.9 (score 99)
    pub fn high_risk() -> Self {
        Self {
            kyc: Ok(KycResult {
                verified: false,
                confidence: 0.1,
            }),
            aml: Ok(AmlResult::flagged(["structuring"])),
            sanctions: Ok(SanctionsResult { flagged: true }),
            whitelist: Ok(WhitelistResult { verified: false }),
            anomaly: Ok(AnomalyResult { score: 0.9 }),
        }
    }

    /// Every provider unreachable
    pub fn outage() -> Self {
        let down = || ProviderError::Unavailable("connection refused".to_string());
        Self {
            kyc: Err(down()),
            aml: Err(down()),
            sanctions: Err(down()),
            whitelist: Err(down()),
            anomaly: Err(down()),
        }
    }
}

/// Providers answering from a script, counting calls per kind
pub struct ScriptedProviders {
    script: Mutex<Script>,
    delay: Duration,
    calls: [AtomicUsize; 5],
}

impl ScriptedProviders {
    pub fn new(script: Script) -> Self {
        Self::with_delay(script, Duration::ZERO)
    }

    pub fn with_delay(script: Script, delay: Duration) -> Self {
        Self {
            script: Mutex::new(script),
            delay,
            calls: Default::default(),
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self, kind: SignalKind) -> usize {
        self.calls[index(kind)].load(Ordering::SeqCst)
    }

    async fn answer<T>(&self, kind: SignalKind, pick: impl FnOnce(&Script) -> ProviderResult<T>) -> ProviderResult<T> {
        self.calls[index(kind)].fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let script = self.script.lock().unwrap().clone();
        pick(&script)
    }
}

fn index(kind: SignalKind) -> usize {
    match kind {
        SignalKind::Kyc => 0,
        SignalKind::Aml => 1,
        SignalKind::Sanctions => 2,
        SignalKind::Whitelist => 3,
        SignalKind::Anomaly => 4,
    }
}

#[async_trait]
impl KycProvider for ScriptedProviders {
    async fn verify(&self, _from: &str, _to: &str) -> ProviderResult<KycResult> {
        self.answer(SignalKind::Kyc, |s| s.kyc.clone()).await
    }
}

#[async_trait]
impl AmlProvider for ScriptedProviders {
    async fn screen(&self, _from: &str, _to: &str) -> ProviderResult<AmlResult> {
        self.answer(SignalKind::Aml, |s| s.aml.clone()).await
    }
}

#[async_trait]
impl SanctionsProvider for ScriptedProviders {
    async fn check(&self, _from: &str, _to: &str) -> ProviderResult<SanctionsResult> {
        self.answer(SignalKind::Sanctions, |s| s.sanctions.clone()).await
    }
}

#[async_trait]
impl WhitelistProvider for ScriptedProviders {
    async fn check(&self, _from: &str, _to: &str) -> ProviderResult<WhitelistResult> {
        self.answer(SignalKind::Whitelist, |s| s.whitelist.clone()).await
    }
}

#[async_trait]
impl AnomalyScorer for ScriptedProviders {
    async fn score(&self, _address: &str, _amount: Decimal) -> ProviderResult<AnomalyResult> {
        self.answer(SignalKind::Anomaly, |s| s.anomaly.clone()).await
    }
}

// =========================================================================
// Audit store and publisher fakes
// =========================================================================

/// In-memory store whose inserts can be switched to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryAuditStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditStore for FlakyStore {
    async fn insert(
        &self,
        record: &AuditRecord,
        events: &[OutboxEvent],
    ) -> Result<AuditRecord, PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("connection reset".to_string()));
        }
        self.inner.insert(record, events).await
    }

    async fn get(&self, check_id: Uuid) -> Result<Option<AuditRecord>, PersistenceError> {
        self.inner.get(check_id).await
    }

    async fn records(&self, limit: i64) -> Result<Vec<AuditRecord>, PersistenceError> {
        self.inner.records(limit).await
    }

    async fn pending_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, PersistenceError> {
        self.inner.pending_events(limit).await
    }

    async fn mark_published(&self, event_id: Uuid) -> Result<(), PersistenceError> {
        self.inner.mark_published(event_id).await
    }

    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        max_attempts: i32,
    ) -> Result<OutboxStatus, PersistenceError> {
        self.inner.mark_failed(event_id, error, max_attempts).await
    }
}

/// Publisher that keeps every delivered event
pub struct RecordingPublisher {
    delivered: Mutex<Vec<OutboxEvent>>,
    up: AtomicBool,
    hanging: AtomicBool,
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            up: AtomicBool::new(true),
            hanging: AtomicBool::new(false),
        }
    }
}

impl RecordingPublisher {
    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    /// Publish calls never resolve while set
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<OutboxEvent> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.delivered().into_iter().map(|e| e.topic).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublicationError> {
        if self.hanging.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if !self.up.load(Ordering::SeqCst) {
            return Err(PublicationError::Failed("broker unreachable".to_string()));
        }
        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// =========================================================================
// Harness
// =========================================================================

pub struct Harness {
    pub engine: ComplianceEngine,
    pub providers: Arc<ScriptedProviders>,
    pub store: Arc<FlakyStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub recorder: AuditRecorder,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        Self::with_providers(ScriptedProviders::new(script))
    }

    pub fn with_providers(providers: ScriptedProviders) -> Self {
        let providers = Arc::new(providers);
        let store = Arc::new(FlakyStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let recorder = AuditRecorder::new(store.clone(), publisher.clone(), RecorderConfig::default());

        let fanout = VerificationFanout::new(
            Providers {
                kyc: providers.clone(),
                aml: providers.clone(),
                sanctions: providers.clone(),
                whitelist: providers.clone(),
                anomaly: providers.clone(),
            },
            GuardConfig::default(),
        );

        let engine = ComplianceEngine::new(
            IdempotencyCoordinator::new(CoordinatorConfig::default()),
            Arc::new(fanout),
            Arc::new(recorder.clone()),
        );

        Self {
            engine,
            providers,
            store,
            publisher,
            recorder,
        }
    }
}

/// A well-formed request for a fixed transfer
pub fn transfer_request(requester: &str) -> TransferCheckRequest {
    TransferCheckRequest::new(
        "0x8ba1f109551bD432803012645Ac136ddd64DBA72",
        "0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B",
        "1500.00",
        "USDC",
    )
    .with_requester(requester)
}

/// Wait until `condition` holds, for work finishing on spawned tasks
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
