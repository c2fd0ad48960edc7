//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::{CourseId, LearnerId, ProgressError, UnitId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `CatalogReader`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("course {course} has duplicate unit position {position}")]
    DuplicatePosition { course: CourseId, position: u32 },

    #[error("unit {0} not found")]
    UnknownUnit(UnitId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ProgressLedger`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("learner {0} is not enrolled in course {1}")]
    NotEnrolled(LearnerId, CourseId),

    #[error("unit {unit} does not belong to course {course}")]
    UnitNotInCourse { unit: UnitId, course: CourseId },

    #[error(transparent)]
    InvalidEvent(#[from] ProgressError),

    #[error("write contention persisted after {0} attempts")]
    Unavailable(u32),

    #[error("summary recompute failed after the event was recorded")]
    Recompute(#[source] AggregatorError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `Aggregator`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AggregatorError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Summary(#[from] course_core::model::SummaryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AccessGuard`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GuardError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the engine facade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
