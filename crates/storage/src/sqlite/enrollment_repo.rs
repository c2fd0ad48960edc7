use course_core::model::{CourseId, Enrollment, LearnerId};

use super::{SqliteRepository, mapping};
use crate::repository::{EnrollmentRepository, StorageError};

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO enrollments (learner_id, course_id, started_at, progress_percent)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(learner_id, course_id) DO UPDATE SET
                -- keep started_at from the original insert; drip timing anchors there
                progress_percent = excluded.progress_percent
            ",
        )
        .bind(mapping::id_i64("learner_id", enrollment.learner_id().value())?)
        .bind(mapping::id_i64("course_id", enrollment.course_id().value())?)
        .bind(enrollment.started_at())
        .bind(enrollment.progress_percent())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_enrollment(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Enrollment, StorageError> {
        let row = sqlx::query(
            r"
            SELECT learner_id, course_id, started_at, progress_percent
            FROM enrollments
            WHERE learner_id = ?1 AND course_id = ?2
            ",
        )
        .bind(mapping::id_i64("learner_id", learner.value())?)
        .bind(mapping::id_i64("course_id", course.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => mapping::map_enrollment_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn delete_enrollment(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            DELETE FROM enrollments
            WHERE learner_id = ?1 AND course_id = ?2
            ",
        )
        .bind(mapping::id_i64("learner_id", learner.value())?)
        .bind(mapping::id_i64("course_id", course.value())?)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        // Item progress and course summaries cascade via foreign keys.
        Ok(())
    }
}
