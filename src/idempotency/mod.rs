//! Idempotency module
//!
//! Collapses identical concurrent checks into one computation and serves
//! recorded decisions from a short-lived cache.

mod coordinator;

pub use coordinator::{CoordinatorConfig, IdempotencyCoordinator, SharedOutcome};
