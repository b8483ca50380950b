//! Domain module
//!
//! Core domain types of the compliance engine.

pub mod amount;
pub mod decision;
pub mod error;
pub mod events;
pub mod request;
pub mod signals;

pub use amount::{Amount, AmountError};
pub use decision::{ComplianceDecision, DecisionStatus, DecisionSummary};
pub use error::{ComplianceError, ValidationError};
pub use events::{ComplianceEvent, TOPIC_CHECK_COMPLETED, TOPIC_SAR_REVIEW};
pub use request::{BlockchainType, TransferCheckRequest};
pub use signals::{
    AmlResult, AnomalyResult, KycResult, Provenance, SanctionsResult, Signal, SignalKind,
    SignalPayload, SignalSet, WhitelistResult, PROVIDER_UNAVAILABLE_FLAG,
};
