//! Risk module
//!
//! Pure scoring and classification of verification signals.

pub mod aggregator;
pub mod policy;

pub use aggregator::{score, RiskAssessment};
pub use policy::decide;
