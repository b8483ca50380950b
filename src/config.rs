//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::audit::RecorderConfig;
use crate::fanout::{CircuitBreakerConfig, GuardConfig};
use crate::idempotency::CoordinatorConfig;
use crate::jobs::JobSchedulerConfig;
use crate::providers::simulated::SimulationConfig;

/// Where verification signals come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// Remote JSON providers at the configured base URLs
    Http,
    /// In-process providers with injected latency
    Simulated,
}

impl FromStr for ProviderMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(ProviderMode::Http),
            "simulated" => Ok(ProviderMode::Simulated),
            _ => Err(ConfigError::InvalidValue("PROVIDER_MODE")),
        }
    }
}

/// Base URLs of the five verification providers
#[derive(Debug, Clone)]
pub struct ProviderUrls {
    pub kyc: String,
    pub aml: String,
    pub sanctions: String,
    pub whitelist: String,
    pub anomaly: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory audit store is used without one
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub cache_ttl: Duration,
    pub cache_capacity: usize,

    pub provider_timeout: Duration,
    pub provider_retry_backoff: Duration,
    pub provider_max_concurrency: usize,
    pub provider_queue_timeout: Duration,

    pub circuit_failure_threshold: u32,
    pub circuit_success_threshold: u32,
    pub circuit_open: Duration,

    pub publish_timeout: Duration,
    pub outbox_relay_interval: Duration,
    pub outbox_max_attempts: i32,

    pub provider_mode: ProviderMode,
    /// Present in `http` mode only
    pub provider_urls: Option<ProviderUrls>,
    /// Outage probability of simulated providers
    pub simulated_failure_rate: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let provider_mode: ProviderMode = env::var("PROVIDER_MODE")
            .unwrap_or_else(|_| "simulated".to_string())
            .parse()?;

        let provider_urls = match provider_mode {
            ProviderMode::Http => Some(ProviderUrls {
                kyc: required("KYC_URL")?,
                aml: required("AML_URL")?,
                sanctions: required("SANCTIONS_URL")?,
                whitelist: required("WHITELIST_URL")?,
                anomaly: required("ANOMALY_URL")?,
            }),
            ProviderMode::Simulated => None,
        };

        let simulated_failure_rate: f64 = parse_or("SIMULATED_FAILURE_RATE", 0.0)?;
        if !(0.0..=1.0).contains(&simulated_failure_rate) {
            return Err(ConfigError::InvalidValue("SIMULATED_FAILURE_RATE"));
        }

        Ok(Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            cache_ttl: Duration::from_secs(parse_or("CACHE_TTL_SECS", 300)?),
            cache_capacity: parse_or("CACHE_CAPACITY", 10_000)?,
            provider_timeout: Duration::from_millis(parse_or("PROVIDER_TIMEOUT_MS", 150)?),
            provider_retry_backoff: Duration::from_millis(parse_or("PROVIDER_RETRY_BACKOFF_MS", 20)?),
            provider_max_concurrency: parse_or("PROVIDER_MAX_CONCURRENCY", 64)?,
            provider_queue_timeout: Duration::from_millis(parse_or("PROVIDER_QUEUE_TIMEOUT_MS", 10)?),
            circuit_failure_threshold: parse_or("CIRCUIT_FAILURE_THRESHOLD", 5)?,
            circuit_success_threshold: parse_or("CIRCUIT_SUCCESS_THRESHOLD", 2)?,
            circuit_open: Duration::from_secs(parse_or("CIRCUIT_OPEN_SECS", 30)?),
            publish_timeout: Duration::from_millis(parse_or("PUBLISH_TIMEOUT_MS", 200)?),
            outbox_relay_interval: Duration::from_secs(parse_or("OUTBOX_RELAY_INTERVAL_SECS", 5)?),
            outbox_max_attempts: parse_or("OUTBOX_MAX_ATTEMPTS", 10)?,
            provider_mode,
            provider_urls,
            simulated_failure_rate,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            call_timeout: self.provider_timeout,
            retry_backoff: self.provider_retry_backoff,
            max_concurrency: self.provider_max_concurrency,
            queue_timeout: self.provider_queue_timeout,
            circuit: CircuitBreakerConfig {
                failure_threshold: self.circuit_failure_threshold,
                success_threshold: self.circuit_success_threshold,
                open_timeout: self.circuit_open,
            },
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            ttl: self.cache_ttl,
            capacity: self.cache_capacity,
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            publish_timeout: self.publish_timeout,
            max_attempts: self.outbox_max_attempts,
        }
    }

    pub fn scheduler_config(&self) -> JobSchedulerConfig {
        JobSchedulerConfig {
            outbox_relay_interval: self.outbox_relay_interval,
            ..Default::default()
        }
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            failure_rate: self.simulated_failure_rate,
            ..Default::default()
        }
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnv(key))
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_mode_parse() {
        assert_eq!("http".parse::<ProviderMode>().unwrap(), ProviderMode::Http);
        assert_eq!("simulated".parse::<ProviderMode>().unwrap(), ProviderMode::Simulated);
        assert!(matches!(
            "grpc".parse::<ProviderMode>(),
            Err(ConfigError::InvalidValue("PROVIDER_MODE"))
        ));
    }

    #[test]
    fn test_parse_or_default_when_unset() {
        let ttl: u64 = parse_or("TRANSFER_COMPLIANCE_TEST_UNSET_VAR", 300).unwrap();
        assert_eq!(ttl, 300);
    }
}
