use chrono::Duration;
use course_core::model::{
    CourseId, CourseProgress, Enrollment, ItemProgress, ItemStatus, LearnerId, Prerequisite, Unit,
    UnitId, UnitKind,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn learner_id_from_i64(v: i64) -> Result<LearnerId, StorageError> {
    Ok(LearnerId::new(i64_to_u64("learner_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn unit_id_from_i64(v: i64) -> Result<UnitId, StorageError> {
    Ok(UnitId::new(i64_to_u64("unit_id", v)?))
}

pub(crate) fn parse_unit_kind(s: &str) -> Result<UnitKind, StorageError> {
    UnitKind::parse(s).map_err(ser)
}

pub(crate) fn parse_item_status(s: &str) -> Result<ItemStatus, StorageError> {
    ItemStatus::parse(s).map_err(ser)
}

pub(crate) fn release_delay_to_secs(delay: Option<Duration>) -> Option<i64> {
    delay.map(|d| d.num_seconds())
}

pub(crate) fn release_delay_from_secs(secs: Option<i64>) -> Option<Duration> {
    secs.map(Duration::seconds)
}

pub(crate) fn map_enrollment_row(row: &sqlx::sqlite::SqliteRow) -> Result<Enrollment, StorageError> {
    let learner_id = learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?;
    let course_id = course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?;
    let started_at = row.try_get("started_at").map_err(ser)?;
    let progress_percent: f64 = row.try_get("progress_percent").map_err(ser)?;

    Enrollment::from_persisted(learner_id, course_id, started_at, progress_percent).map_err(ser)
}

pub(crate) fn map_unit_row(
    row: &sqlx::sqlite::SqliteRow,
    prerequisites: Vec<Prerequisite>,
) -> Result<Unit, StorageError> {
    let id = unit_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let course_id = course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?;
    let title: String = row.try_get("title").map_err(ser)?;
    let position = u32_from_i64("position", row.try_get::<i64, _>("position").map_err(ser)?)?;
    let kind_str: String = row.try_get("kind").map_err(ser)?;
    let kind = parse_unit_kind(kind_str.as_str())?;
    let release_delay =
        release_delay_from_secs(row.try_get::<Option<i64>, _>("release_delay_secs").map_err(ser)?);

    Unit::new(id, course_id, title, position, kind, prerequisites, release_delay).map_err(ser)
}

pub(crate) fn map_item_row(row: &sqlx::sqlite::SqliteRow) -> Result<ItemProgress, StorageError> {
    let learner_id = learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?;
    let unit_id = unit_id_from_i64(row.try_get::<i64, _>("unit_id").map_err(ser)?)?;
    let course_id = course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?;
    let status_str: String = row.try_get("status").map_err(ser)?;
    let status = parse_item_status(status_str.as_str())?;
    let score: Option<f64> = row.try_get("score").map_err(ser)?;
    let time_spent_sec = u32_from_i64(
        "time_spent_sec",
        row.try_get::<i64, _>("time_spent_sec").map_err(ser)?,
    )?;
    let revision = u32_from_i64("revision", row.try_get::<i64, _>("revision").map_err(ser)?)?;
    let updated_at = row.try_get("updated_at").map_err(ser)?;

    ItemProgress::from_persisted(
        learner_id,
        unit_id,
        course_id,
        status,
        score,
        time_spent_sec,
        revision,
        updated_at,
    )
    .map_err(ser)
}

pub(crate) fn map_summary_row(row: &sqlx::sqlite::SqliteRow) -> Result<CourseProgress, StorageError> {
    let learner_id = learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?;
    let course_id = course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?;
    let completed_units = u32_from_i64(
        "completed_units",
        row.try_get::<i64, _>("completed_units").map_err(ser)?,
    )?;
    let percentage: f64 = row.try_get("percentage").map_err(ser)?;
    let first_started_at = row.try_get("first_started_at").map_err(ser)?;

    CourseProgress::from_persisted(learner_id, course_id, completed_units, percentage, first_started_at)
        .map_err(ser)
}
