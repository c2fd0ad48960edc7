use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LearnerId};

/// Errors raised while rehydrating enrollments from storage.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum EnrollmentError {
    #[error("cached progress percent out of range: {0}")]
    PercentOutOfRange(f64),
}

/// The relationship recording that a learner has joined a course.
///
/// Anchors drip-delay timing via `started_at`. The cached
/// `progress_percent` is derived state written only by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    learner_id: LearnerId,
    course_id: CourseId,
    started_at: DateTime<Utc>,
    progress_percent: f64,
}

impl Enrollment {
    /// Create a fresh enrollment at 0% progress.
    #[must_use]
    pub fn new(learner_id: LearnerId, course_id: CourseId, started_at: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            course_id,
            started_at,
            progress_percent: 0.0,
        }
    }

    /// Rehydrate an enrollment from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentError::PercentOutOfRange` if the cached percent is
    /// not within `0..=100`.
    pub fn from_persisted(
        learner_id: LearnerId,
        course_id: CourseId,
        started_at: DateTime<Utc>,
        progress_percent: f64,
    ) -> Result<Self, EnrollmentError> {
        if !(0.0..=100.0).contains(&progress_percent) {
            return Err(EnrollmentError::PercentOutOfRange(progress_percent));
        }
        Ok(Self {
            learner_id,
            course_id,
            started_at,
            progress_percent,
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
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        self.progress_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn fresh_enrollment_starts_at_zero() {
        let enrollment = Enrollment::new(LearnerId::new(1), CourseId::new(2), fixed_now());
        assert_eq!(enrollment.progress_percent(), 0.0);
        assert_eq!(enrollment.started_at(), fixed_now());
    }

    #[test]
    fn rejects_out_of_range_percent() {
        let err =
            Enrollment::from_persisted(LearnerId::new(1), CourseId::new(2), fixed_now(), 101.0)
                .unwrap_err();
        assert!(matches!(err, EnrollmentError::PercentOutOfRange(_)));
    }
}
