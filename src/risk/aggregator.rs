//! Risk aggregation
//!
//! Deterministic weighted sum over the five signals. Rules are evaluated in
//! a fixed order so the reasoning text is stable.

use crate::domain::SignalSet;

pub const KYC_WEIGHT: u32 = 30;
pub const AML_WEIGHT: u32 = 30;
pub const SANCTIONS_WEIGHT: u32 = 20;
pub const WHITELIST_WEIGHT: u32 = 10;
/// Anomaly score in [0, 1] is scaled to [0, 10]
pub const ANOMALY_SCALE: f64 = 10.0;
pub const MAX_RISK_SCORE: u32 = 100;

pub const REASON_ALL_PASSED: &str = "All checks passed";

/// Score and ordered reasoning for a signal set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub risk_score: u8,
    pub reasoning: Vec<String>,
}

/// Pure scoring function
pub fn score(signals: &SignalSet) -> RiskAssessment {
    let mut total: u32 = 0;
    let mut reasoning = Vec::new();

    if !signals.kyc.value.verified {
        total += KYC_WEIGHT;
        reasoning.push("Incomplete KYC".to_string());
    }

    let flags = &signals.aml.value.flags;
    if !flags.is_empty() {
        total += AML_WEIGHT;
        let joined = flags.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
        reasoning.push(format!("AML flags: {}", joined));
    }

    if signals.sanctions.value.flagged {
        total += SANCTIONS_WEIGHT;
        reasoning.push("Sanctions match".to_string());
    }

    if !signals.whitelist.value.verified {
        total += WHITELIST_WEIGHT;
        reasoning.push("Peer not whitelisted".to_string());
    }

    total += anomaly_points(signals.anomaly.value.score);

    if reasoning.is_empty() {
        reasoning.push(REASON_ALL_PASSED.to_string());
    }

    RiskAssessment {
        risk_score: total.min(MAX_RISK_SCORE) as u8,
        reasoning,
    }
}

/// Floor of score * 10, with out-of-range and NaN scores treated fail-closed
fn anomaly_points(score: f64) -> u32 {
    let score = if score.is_nan() { 1.0 } else { score.clamp(0.0, 1.0) };
    (score * ANOMALY_SCALE).floor() as u32
}
