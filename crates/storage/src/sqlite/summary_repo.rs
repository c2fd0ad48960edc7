use course_core::model::{CourseId, CourseProgress, LearnerId};

use super::{SqliteRepository, mapping};
use crate::repository::{CourseProgressRepository, StorageError};

#[async_trait::async_trait]
impl CourseProgressRepository for SqliteRepository {
    async fn find_summary(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT learner_id, course_id, completed_units, percentage, first_started_at
            FROM course_progress
            WHERE learner_id = ?1 AND course_id = ?2
            ",
        )
        .bind(mapping::id_i64("learner_id", learner.value())?)
        .bind(mapping::id_i64("course_id", course.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(mapping::map_summary_row).transpose()
    }

    async fn store_summary(&self, summary: &CourseProgress) -> Result<(), StorageError> {
        let learner_id = mapping::id_i64("learner_id", summary.learner_id().value())?;
        let course_id = mapping::id_i64("course_id", summary.course_id().value())?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        // The enrollment cache and the summary row move together; a missing
        // enrollment aborts before anything is written.
        let updated = sqlx::query(
            r"
            UPDATE enrollments SET progress_percent = ?1
            WHERE learner_id = ?2 AND course_id = ?3
            ",
        )
        .bind(summary.percentage())
        .bind(learner_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        sqlx::query(
            r"
            INSERT INTO course_progress (
                learner_id, course_id, completed_units, percentage, first_started_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(learner_id, course_id) DO UPDATE SET
                completed_units = excluded.completed_units,
                percentage = excluded.percentage,
                first_started_at = excluded.first_started_at
            ",
        )
        .bind(learner_id)
        .bind(course_id)
        .bind(i64::from(summary.completed_units()))
        .bind(summary.percentage())
        .bind(summary.first_started_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
