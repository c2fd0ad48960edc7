use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::UnitId;

/// A single blocking condition reported by the access guard.
///
/// Advisory, not an error: the guard returns every applicable reason so
/// callers can render them all at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    /// No enrollment exists for the unit's course.
    NotEnrolled,
    /// A prerequisite unit has not reached the required completion or score.
    LockedByPrereq {
        unit_id: UnitId,
        title: String,
        min_score: Option<f64>,
    },
    /// The unit's release delay has not yet elapsed.
    LockedByDrip { available_at: DateTime<Utc> },
}

/// Outcome of an access-guard evaluation for a `(learner, unit)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reasons: Vec<Reason>,
}

impl AccessDecision {
    /// Access permitted, no blocking reasons.
    #[must_use]
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reasons: Vec::new(),
        }
    }

    /// Access denied for the given reasons.
    #[must_use]
    pub fn denied(reasons: Vec<Reason>) -> Self {
        Self {
            allowed: false,
            reasons,
        }
    }

    /// Build a decision from collected reasons: allowed iff none were
    /// collected.
    #[must_use]
    pub fn from_reasons(reasons: Vec<Reason>) -> Self {
        Self {
            allowed: reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reasons_allow_access() {
        let decision = AccessDecision::from_reasons(Vec::new());
        assert!(decision.allowed);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn any_reason_denies_access() {
        let decision = AccessDecision::from_reasons(vec![Reason::NotEnrolled]);
        assert!(!decision.allowed);
        assert_eq!(decision.reasons, vec![Reason::NotEnrolled]);
    }
}
