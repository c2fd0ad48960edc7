use course_core::model::{CourseId, ItemProgress, LearnerId, UnitId};

use super::{SqliteRepository, mapping};
use crate::repository::{ItemProgressRepository, StorageError};

fn map_write_error(e: sqlx::Error) -> StorageError {
    if e.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
    {
        StorageError::Conflict
    } else {
        StorageError::Connection(e.to_string())
    }
}

#[async_trait::async_trait]
impl ItemProgressRepository for SqliteRepository {
    async fn find_item(
        &self,
        learner: LearnerId,
        unit: UnitId,
    ) -> Result<Option<ItemProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT learner_id, unit_id, course_id, status, score,
                   time_spent_sec, revision, updated_at
            FROM item_progress
            WHERE learner_id = ?1 AND unit_id = ?2
            ",
        )
        .bind(mapping::id_i64("learner_id", learner.value())?)
        .bind(mapping::id_i64("unit_id", unit.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(mapping::map_item_row).transpose()
    }

    async fn items_for_course(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Vec<ItemProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT learner_id, unit_id, course_id, status, score,
                   time_spent_sec, revision, updated_at
            FROM item_progress
            WHERE learner_id = ?1 AND course_id = ?2
            ",
        )
        .bind(mapping::id_i64("learner_id", learner.value())?)
        .bind(mapping::id_i64("course_id", course.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(mapping::map_item_row(&row)?);
        }
        Ok(items)
    }

    async fn insert_item(&self, item: &ItemProgress) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO item_progress (
                learner_id, unit_id, course_id, status, score,
                time_spent_sec, revision, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(mapping::id_i64("learner_id", item.learner_id().value())?)
        .bind(mapping::id_i64("unit_id", item.unit_id().value())?)
        .bind(mapping::id_i64("course_id", item.course_id().value())?)
        .bind(item.status().as_str())
        .bind(item.score())
        .bind(i64::from(item.time_spent_sec()))
        .bind(i64::from(item.revision()))
        .bind(item.updated_at())
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn update_item(
        &self,
        item: &ItemProgress,
        expected_revision: u32,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE item_progress SET
                status = ?1,
                score = ?2,
                time_spent_sec = ?3,
                revision = ?4,
                updated_at = ?5
            WHERE learner_id = ?6 AND unit_id = ?7 AND revision = ?8
            ",
        )
        .bind(item.status().as_str())
        .bind(item.score())
        .bind(i64::from(item.time_spent_sec()))
        .bind(i64::from(item.revision()))
        .bind(item.updated_at())
        .bind(mapping::id_i64("learner_id", item.learner_id().value())?)
        .bind(mapping::id_i64("unit_id", item.unit_id().value())?)
        .bind(i64::from(expected_revision))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Either the row vanished or another writer moved the revision;
            // the ledger re-reads and retries in both cases.
            return Err(StorageError::Conflict);
        }
        Ok(())
    }
}
