//! Scheduled Jobs
//!
//! Background maintenance: the outbox relay re-publishes events that missed
//! their first delivery, and expired decisions are purged from the cache.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::audit::{AuditRecorder, PersistenceError, RelayReport};
use crate::idempotency::IdempotencyCoordinator;

/// Re-publish pending outbox events
pub async fn relay_outbox(recorder: &AuditRecorder, batch_size: i64) -> Result<RelayReport, JobError> {
    Ok(recorder.relay_pending(batch_size).await?)
}

/// Drop expired cache entries
pub fn purge_decision_cache(coordinator: &IdempotencyCoordinator) -> usize {
    let purged = coordinator.purge_expired();
    if purged > 0 {
        tracing::debug!(purged, "Purged expired cached decisions");
    }
    purged
}

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for the outbox relay (default: 5 seconds)
    pub outbox_relay_interval: Duration,
    /// Events relayed per pass
    pub outbox_batch_size: i64,
    /// Interval for cache purging (default: 1 minute)
    pub cache_purge_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            outbox_relay_interval: Duration::from_secs(5),
            outbox_batch_size: 100,
            cache_purge_interval: Duration::from_secs(60),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    recorder: AuditRecorder,
    coordinator: IdempotencyCoordinator,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(recorder: AuditRecorder, coordinator: IdempotencyCoordinator) -> Self {
        Self::with_config(recorder, coordinator, JobSchedulerConfig::default())
    }

    pub fn with_config(
        recorder: AuditRecorder,
        coordinator: IdempotencyCoordinator,
        config: JobSchedulerConfig,
    ) -> Self {
        Self {
            recorder,
            coordinator,
            config,
        }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut relay_interval = interval(self.config.outbox_relay_interval);
        relay_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut purge_interval = interval(self.config.cache_purge_interval);

        loop {
            tokio::select! {
                _ = relay_interval.tick() => {
                    if let Err(e) = relay_outbox(&self.recorder, self.config.outbox_batch_size).await {
                        tracing::error!(error = %e, "Outbox relay failed");
                    }
                }
                _ = purge_interval.tick() => {
                    purge_decision_cache(&self.coordinator);
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match relay_outbox(&self.recorder, self.config.outbox_batch_size).await {
            Ok(relay) => report.relay = relay,
            Err(e) => report.errors.push(format!("Outbox relay: {}", e)),
        }

        report.cache_entries_purged = purge_decision_cache(&self.coordinator);
        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub relay: RelayReport,
    pub cache_entries_purged: usize,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}
