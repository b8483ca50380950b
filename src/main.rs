//! Transfer compliance server
//!
//! Serves compliance decisions over HTTP. Decisions are recorded in Postgres
//! when `DATABASE_URL` is set, otherwise in process memory.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transfer_compliance::api::{self, AppState};
use transfer_compliance::audit::{
    AuditRecorder, AuditStore, BroadcastEventPublisher, InMemoryAuditStore, PgAuditStore,
};
use transfer_compliance::config::{Config, ProviderMode};
use transfer_compliance::db;
use transfer_compliance::engine::ComplianceEngine;
use transfer_compliance::fanout::{Providers, VerificationFanout};
use transfer_compliance::idempotency::IdempotencyCoordinator;
use transfer_compliance::jobs::JobScheduler;
use transfer_compliance::providers::http::HttpProvider;
use transfer_compliance::providers::simulated::SimulatedProvider;

/// Initialize tracing/logging
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "transfer_compliance=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_providers(config: &Config) -> anyhow::Result<Providers> {
    match (config.provider_mode, &config.provider_urls) {
        (ProviderMode::Http, Some(urls)) => {
            let client = |url: &str| HttpProvider::new(url, config.provider_timeout);
            Ok(Providers {
                kyc: Arc::new(client(&urls.kyc)?),
                aml: Arc::new(client(&urls.aml)?),
                sanctions: Arc::new(client(&urls.sanctions)?),
                whitelist: Arc::new(client(&urls.whitelist)?),
                anomaly: Arc::new(client(&urls.anomaly)?),
            })
        }
        (ProviderMode::Http, None) => Err(anyhow::anyhow!("provider URLs are not configured")),
        (ProviderMode::Simulated, _) => {
            tracing::warn!("Using simulated verification providers");
            let simulated = Arc::new(SimulatedProvider::new(config.simulation_config()));
            Ok(Providers {
                kyc: simulated.clone(),
                aml: simulated.clone(),
                sanctions: simulated.clone(),
                whitelist: simulated.clone(),
                anomaly: simulated,
            })
        }
    }
}

async fn connect_store(config: &Config) -> anyhow::Result<(Arc<dyn AuditStore>, Option<PgPool>)> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, decisions are kept in memory only");
        let store: Arc<dyn AuditStore> = Arc::new(InMemoryAuditStore::new());
        return Ok((store, None));
    };

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await?;

    db::verify_connection(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");
    let store: Arc<dyn AuditStore> = Arc::new(PgAuditStore::new(pool.clone()));
    Ok((store, Some(pool)))
}

/// Log every published event; stands in for a downstream consumer
fn spawn_event_logger(publisher: &BroadcastEventPublisher) {
    let mut rx = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(
                    event_id = %event.id,
                    check_id = %event.check_id,
                    topic = %event.topic,
                    "Event published"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting transfer compliance server");

    let (store, pool) = connect_store(&config).await?;

    let publisher = BroadcastEventPublisher::new(1024);
    spawn_event_logger(&publisher);

    let recorder = AuditRecorder::new(store, Arc::new(publisher), config.recorder_config());
    let coordinator = IdempotencyCoordinator::new(config.coordinator_config());
    let fanout = VerificationFanout::new(build_providers(&config)?, config.guard_config());

    let scheduler = JobScheduler::with_config(
        recorder.clone(),
        coordinator.clone(),
        config.scheduler_config(),
    )
    .start();

    let engine = ComplianceEngine::new(coordinator, Arc::new(fanout), Arc::new(recorder));
    let app = api::build_router(AppState { engine });

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    scheduler.abort();
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
