//! Transfer compliance decision engine
//!
//! Re-exports modules for the server binary, the load test and integration
//! testing.

pub mod api;
pub mod audit;
pub mod domain;
pub mod engine;
pub mod fanout;
pub mod fingerprint;
pub mod idempotency;
pub mod jobs;
pub mod providers;
pub mod risk;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use engine::ComplianceEngine;
pub use error::{AppError, AppResult};
pub use domain::{
    Amount, AmountError, ComplianceDecision, ComplianceError, DecisionStatus, TransferCheckRequest,
    ValidationError,
};
