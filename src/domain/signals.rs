//! Verification signals
//!
//! One typed result per verification provider, wrapped with the provenance
//! of the answer. Every payload knows its own fail-closed fallback.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// AML flag substituted when the AML provider cannot answer
pub const PROVIDER_UNAVAILABLE_FLAG: &str = "PROVIDER_UNAVAILABLE";

/// Which provider produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Kyc,
    Aml,
    Sanctions,
    Whitelist,
    Anomaly,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::Kyc,
        SignalKind::Aml,
        SignalKind::Sanctions,
        SignalKind::Whitelist,
        SignalKind::Anomaly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Kyc => "kyc",
            SignalKind::Aml => "aml",
            SignalKind::Sanctions => "sanctions",
            SignalKind::Whitelist => "whitelist",
            SignalKind::Anomaly => "anomaly",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the real provider answered or a fallback was substituted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    Ok,
    Timeout,
    Unavailable,
}

impl Provenance {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, Provenance::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycResult {
    pub verified: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AmlResult {
    pub flags: BTreeSet<String>,
}

impl AmlResult {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn flagged<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionsResult {
    pub flagged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistResult {
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Anomaly score in [0, 1]
    pub score: f64,
}

/// Payload produced by one provider kind
pub trait SignalPayload: Clone + Send + Sync + 'static {
    const KIND: SignalKind;

    /// Most restrictive value, used whenever the provider cannot answer.
    fn fail_closed() -> Self;

    /// Bring a provider answer into its documented range.
    fn sanitize(self) -> Self {
        self
    }
}

impl SignalPayload for KycResult {
    const KIND: SignalKind = SignalKind::Kyc;

    fn fail_closed() -> Self {
        Self {
            verified: false,
            confidence: 0.0,
        }
    }

    fn sanitize(self) -> Self {
        let confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        Self { confidence, ..self }
    }
}

impl SignalPayload for AmlResult {
    const KIND: SignalKind = SignalKind::Aml;

    fn fail_closed() -> Self {
        Self::flagged([PROVIDER_UNAVAILABLE_FLAG])
    }

    fn sanitize(self) -> Self {
        Self {
            flags: self
                .flags
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }
}

impl SignalPayload for SanctionsResult {
    const KIND: SignalKind = SignalKind::Sanctions;

    fn fail_closed() -> Self {
        Self { flagged: true }
    }
}

impl SignalPayload for WhitelistResult {
    const KIND: SignalKind = SignalKind::Whitelist;

    fn fail_closed() -> Self {
        Self { verified: false }
    }
}

impl SignalPayload for AnomalyResult {
    const KIND: SignalKind = SignalKind::Anomaly;

    fn fail_closed() -> Self {
        Self { score: 1.0 }
    }

    fn sanitize(self) -> Self {
        if self.score.is_nan() {
            return Self::fail_closed();
        }
        Self {
            score: self.score.clamp(0.0, 1.0),
        }
    }
}

/// A provider answer (or its substitute) plus where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal<T> {
    pub value: T,
    pub provenance: Provenance,
}

impl<T: SignalPayload> Signal<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value: value.sanitize(),
            provenance: Provenance::Ok,
        }
    }

    pub fn fallback(provenance: Provenance) -> Self {
        Self {
            value: T::fail_closed(),
            provenance,
        }
    }

    pub fn kind(&self) -> SignalKind {
        T::KIND
    }
}

/// The five signals a decision is based on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    pub kyc: Signal<KycResult>,
    pub aml: Signal<AmlResult>,
    pub sanctions: Signal<SanctionsResult>,
    pub whitelist: Signal<WhitelistResult>,
    pub anomaly: Signal<AnomalyResult>,
}

impl SignalSet {
    /// Provenance of every signal, in fixed kind order
    pub fn provenances(&self) -> [(SignalKind, Provenance); 5] {
        [
            (SignalKind::Kyc, self.kyc.provenance),
            (SignalKind::Aml, self.aml.provenance),
            (SignalKind::Sanctions, self.sanctions.provenance),
            (SignalKind::Whitelist, self.whitelist.provenance),
            (SignalKind::Anomaly, self.anomaly.provenance),
        ]
    }

    /// Kinds whose value is a fallback rather than a provider answer
    pub fn degraded(&self) -> Vec<SignalKind> {
        self.provenances()
            .into_iter()
            .filter(|(_, p)| p.is_degraded())
            .map(|(k, _)| k)
            .collect()
    }

    /// Every signal replaced by its fallback
    pub fn all_fallback(provenance: Provenance) -> Self {
        Self {
            kyc: Signal::fallback(provenance),
            aml: Signal::fallback(provenance),
            sanctions: Signal::fallback(provenance),
            whitelist: Signal::fallback(provenance),
            anomaly: Signal::fallback(provenance),
        }
    }
}

#[cfg(test)]
impl SignalSet {
    /// Every provider answered and found nothing
    pub(crate) fn clean() -> Self {
        Self {
            kyc: Signal::ok(KycResult {
                verified: true,
                confidence: 0.99,
            }),
            aml: Signal::ok(AmlResult::clean()),
            sanctions: Signal::ok(SanctionsResult { flagged: false }),
            whitelist: Signal::ok(WhitelistResult { verified: true }),
            anomaly: Signal::ok(AnomalyResult { score: 0.1 }),
        }
    }
}
