use std::collections::HashMap;

use course_core::model::{CourseId, Prerequisite, Unit, UnitId};
use sqlx::Row;

use super::{SqliteRepository, mapping};
use crate::repository::{CatalogRepository, StorageError};

fn map_prereq_row(row: &sqlx::sqlite::SqliteRow) -> Result<(i64, Prerequisite), StorageError> {
    let unit_id: i64 = row.try_get("unit_id").map_err(mapping::ser)?;
    let prereq_unit_id =
        mapping::unit_id_from_i64(row.try_get::<i64, _>("prereq_unit_id").map_err(mapping::ser)?)?;
    let min_score: Option<f64> = row.try_get("min_score").map_err(mapping::ser)?;
    Ok((
        unit_id,
        Prerequisite {
            unit_id: prereq_unit_id,
            min_score,
        },
    ))
}

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_unit(&self, unit: &Unit) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO units (id, course_id, title, position, kind, release_delay_secs)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title,
                position = excluded.position,
                kind = excluded.kind,
                release_delay_secs = excluded.release_delay_secs
            ",
        )
        .bind(mapping::id_i64("unit_id", unit.id().value())?)
        .bind(mapping::id_i64("course_id", unit.course_id().value())?)
        .bind(unit.title().to_owned())
        .bind(i64::from(unit.position()))
        .bind(unit.kind().as_str())
        .bind(mapping::release_delay_to_secs(unit.release_delay()))
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM unit_prerequisites WHERE unit_id = ?1")
            .bind(mapping::id_i64("unit_id", unit.id().value())?)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for prereq in unit.prerequisites() {
            sqlx::query(
                r"
                INSERT INTO unit_prerequisites (unit_id, prereq_unit_id, min_score)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(mapping::id_i64("unit_id", unit.id().value())?)
            .bind(mapping::id_i64("prereq_unit_id", prereq.unit_id.value())?)
            .bind(prereq.min_score)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_unit(&self, id: UnitId) -> Result<Unit, StorageError> {
        let unit_id = mapping::id_i64("unit_id", id.value())?;

        let row = sqlx::query(
            r"
            SELECT id, course_id, title, position, kind, release_delay_secs
            FROM units
            WHERE id = ?1
            ",
        )
        .bind(unit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Err(StorageError::NotFound);
        };

        let prereq_rows = sqlx::query(
            r"
            SELECT unit_id, prereq_unit_id, min_score
            FROM unit_prerequisites
            WHERE unit_id = ?1
            ",
        )
        .bind(unit_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut prerequisites = Vec::with_capacity(prereq_rows.len());
        for prereq_row in prereq_rows {
            let (_, prereq) = map_prereq_row(&prereq_row)?;
            prerequisites.push(prereq);
        }

        mapping::map_unit_row(&row, prerequisites)
    }

    async fn units_for_course(&self, course: CourseId) -> Result<Vec<Unit>, StorageError> {
        let course_id = mapping::id_i64("course_id", course.value())?;

        let rows = sqlx::query(
            r"
            SELECT id, course_id, title, position, kind, release_delay_secs
            FROM units
            WHERE course_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let prereq_rows = sqlx::query(
            r"
            SELECT p.unit_id, p.prereq_unit_id, p.min_score
            FROM unit_prerequisites p
            JOIN units u ON u.id = p.unit_id
            WHERE u.course_id = ?1
            ",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut prereqs_by_unit: HashMap<i64, Vec<Prerequisite>> = HashMap::new();
        for prereq_row in prereq_rows {
            let (unit_id, prereq) = map_prereq_row(&prereq_row)?;
            prereqs_by_unit.entry(unit_id).or_default().push(prereq);
        }

        let mut units = Vec::with_capacity(rows.len());
        for row in rows {
            let unit_id: i64 = row.try_get("id").map_err(mapping::ser)?;
            let prerequisites = prereqs_by_unit.remove(&unit_id).unwrap_or_default();
            units.push(mapping::map_unit_row(&row, prerequisites)?);
        }

        Ok(units)
    }
}
