//! Decision policy
//!
//! Fixed-boundary classifier from risk score to decision status.

use crate::domain::DecisionStatus;

/// Lowest score that is escalated
pub const ESCALATE_AT: u8 = 30;
/// Lowest score that is rejected
pub const REJECT_AT: u8 = 70;

/// `< 30` approved, `30..70` escalated, `>= 70` rejected
pub fn decide(risk_score: u8) -> DecisionStatus {
    if risk_score >= REJECT_AT {
        DecisionStatus::Rejected
    } else if risk_score >= ESCALATE_AT {
        DecisionStatus::Escalated
    } else {
        DecisionStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_are_exact() {
        assert_eq!(decide(29), DecisionStatus::Approved);
        assert_eq!(decide(30), DecisionStatus::Escalated);
        assert_eq!(decide(69), DecisionStatus::Escalated);
        assert_eq!(decide(70), DecisionStatus::Rejected);
    }

    #[test]
    fn test_extremes() {
        assert_eq!(decide(0), DecisionStatus::Approved);
        assert_eq!(decide(100), DecisionStatus::Rejected);
        assert_eq!(decide(u8::MAX), DecisionStatus::Rejected);
    }

    #[test]
    fn test_monotonic() {
        let mut previous = decide(0);
        for s in 1..=100u8 {
            let current = decide(s);
            assert!(current >= previous, "status regressed at {}", s);
            previous = current;
        }
    }
}
