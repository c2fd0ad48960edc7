use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (enrollments, units with prerequisites,
/// item progress, course summaries, and indexes).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS enrollments (
                    learner_id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    started_at TEXT NOT NULL,
                    progress_percent REAL NOT NULL
                        CHECK (progress_percent BETWEEN 0 AND 100),
                    PRIMARY KEY (learner_id, course_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS units (
                    id INTEGER PRIMARY KEY,
                    course_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    kind TEXT NOT NULL,
                    release_delay_secs INTEGER CHECK (release_delay_secs >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS unit_prerequisites (
                    unit_id INTEGER NOT NULL,
                    prereq_unit_id INTEGER NOT NULL,
                    min_score REAL CHECK (min_score BETWEEN 0 AND 100),
                    PRIMARY KEY (unit_id, prereq_unit_id),
                    FOREIGN KEY (unit_id) REFERENCES units(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS item_progress (
                    learner_id INTEGER NOT NULL,
                    unit_id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    score REAL CHECK (score BETWEEN 0 AND 100),
                    time_spent_sec INTEGER NOT NULL CHECK (time_spent_sec >= 0),
                    revision INTEGER NOT NULL CHECK (revision >= 0),
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (learner_id, unit_id),
                    FOREIGN KEY (learner_id, course_id)
                        REFERENCES enrollments(learner_id, course_id)
                        ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS course_progress (
                    learner_id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    completed_units INTEGER NOT NULL CHECK (completed_units >= 0),
                    percentage REAL NOT NULL CHECK (percentage BETWEEN 0 AND 100),
                    first_started_at TEXT,
                    PRIMARY KEY (learner_id, course_id),
                    FOREIGN KEY (learner_id, course_id)
                        REFERENCES enrollments(learner_id, course_id)
                        ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_units_course_position
                    ON units (course_id, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_item_progress_learner_course
                    ON item_progress (learner_id, course_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
