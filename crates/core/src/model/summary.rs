use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LearnerId};

/// Errors raised while validating course summaries.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SummaryError {
    #[error("percentage out of range: {0}")]
    PercentOutOfRange(f64),

    #[error("completed count ({completed}) exceeds unit total ({total})")]
    CountExceedsTotal { completed: u32, total: u32 },
}

/// Derived whole-course progress for one learner, keyed by
/// `(learner_id, course_id)`.
///
/// Always recomputed from the item-progress rows; never hand-edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseProgress {
    learner_id: LearnerId,
    course_id: CourseId,
    completed_units: u32,
    percentage: f64,
    first_started_at: Option<DateTime<Utc>>,
}

impl CourseProgress {
    /// Derive a summary from a completed count and a unit total.
    ///
    /// An empty course yields exactly 0.0 percent; there is no division by
    /// zero.
    ///
    /// # Errors
    ///
    /// Returns `SummaryError::CountExceedsTotal` if `completed > total`.
    pub fn compute(
        learner_id: LearnerId,
        course_id: CourseId,
        completed_units: u32,
        total_units: u32,
        first_started_at: Option<DateTime<Utc>>,
    ) -> Result<Self, SummaryError> {
        if completed_units > total_units {
            return Err(SummaryError::CountExceedsTotal {
                completed: completed_units,
                total: total_units,
            });
        }
        let percentage = if total_units == 0 {
            0.0
        } else {
            100.0 * f64::from(completed_units) / f64::from(total_units)
        };
        Ok(Self {
            learner_id,
            course_id,
            completed_units,
            percentage,
            first_started_at,
        })
    }

    /// Rehydrate a summary from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SummaryError::PercentOutOfRange` if the stored percentage is
    /// not within `0..=100`.
    pub fn from_persisted(
        learner_id: LearnerId,
        course_id: CourseId,
        completed_units: u32,
        percentage: f64,
        first_started_at: Option<DateTime<Utc>>,
    ) -> Result<Self, SummaryError> {
        if !(0.0..=100.0).contains(&percentage) {
            return Err(SummaryError::PercentOutOfRange(percentage));
        }
        Ok(Self {
            learner_id,
            course_id,
            completed_units,
            percentage,
            first_started_at,
        })
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn completed_units(&self) -> u32 {
        self.completed_units
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    #[must_use]
    pub fn first_started_at(&self) -> Option<DateTime<Utc>> {
        self.first_started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_of_two_units_is_exactly_fifty_percent() {
        let summary =
            CourseProgress::compute(LearnerId::new(1), CourseId::new(1), 1, 2, None).unwrap();
        assert_eq!(summary.percentage(), 50.0);
        assert_eq!(summary.completed_units(), 1);
    }

    #[test]
    fn empty_course_is_zero_percent() {
        let summary =
            CourseProgress::compute(LearnerId::new(1), CourseId::new(1), 0, 0, None).unwrap();
        assert_eq!(summary.percentage(), 0.0);
    }

    #[test]
    fn completed_may_not_exceed_total() {
        let err =
            CourseProgress::compute(LearnerId::new(1), CourseId::new(1), 3, 2, None).unwrap_err();
        assert!(matches!(err, SummaryError::CountExceedsTotal { .. }));
    }

    #[test]
    fn persisted_percent_must_be_in_range() {
        let err =
            CourseProgress::from_persisted(LearnerId::new(1), CourseId::new(1), 1, 120.0, None)
                .unwrap_err();
        assert!(matches!(err, SummaryError::PercentOutOfRange(_)));
    }
}
