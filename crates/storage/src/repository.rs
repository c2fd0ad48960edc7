use async_trait::async_trait;
use course_core::model::{
    CourseId, CourseProgress, Enrollment, ItemProgress, LearnerId, Unit, UnitId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for enrollments.
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Persist or update an enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the enrollment cannot be stored.
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError>;

    /// Fetch the enrollment for a learner/course pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_enrollment(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Enrollment, StorageError>;

    /// Remove an enrollment, cascading removal of the pair's item-progress
    /// and summary rows.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such enrollment exists.
    async fn delete_enrollment(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<(), StorageError>;
}

/// Repository contract for the externally-owned unit catalog.
///
/// The engine only reads units; `upsert_unit` exists so the external
/// catalog source can be loaded and for test seeding.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist or update a unit definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the unit cannot be stored.
    async fn upsert_unit(&self, unit: &Unit) -> Result<(), StorageError>;

    /// Fetch a unit by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_unit(&self, id: UnitId) -> Result<Unit, StorageError>;

    /// Fetch all units of a course, ascending by position.
    ///
    /// Position ties are returned as stored; the catalog reader reports
    /// them as a data error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on lookup failure.
    async fn units_for_course(&self, course: CourseId) -> Result<Vec<Unit>, StorageError>;
}

/// Repository contract for the progress ledger's item rows.
///
/// Writes are split into insert and compare-and-swap update so concurrent
/// events for the same `(learner, unit)` key serialize: a writer that lost
/// the race sees `StorageError::Conflict` and retries from a fresh read.
#[async_trait]
pub trait ItemProgressRepository: Send + Sync {
    /// Fetch the row for a learner/unit pair, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on lookup failure.
    async fn find_item(
        &self,
        learner: LearnerId,
        unit: UnitId,
    ) -> Result<Option<ItemProgress>, StorageError>;

    /// Fetch all of a learner's rows for one course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on lookup failure.
    async fn items_for_course(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Vec<ItemProgress>, StorageError>;

    /// Insert a new row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a row already exists for the key.
    async fn insert_item(&self, item: &ItemProgress) -> Result<(), StorageError>;

    /// Replace an existing row, guarded by its revision.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the stored revision no longer
    /// matches `expected_revision`, or `StorageError::NotFound` if the row
    /// vanished.
    async fn update_item(
        &self,
        item: &ItemProgress,
        expected_revision: u32,
    ) -> Result<(), StorageError>;
}

/// Repository contract for derived course summaries.
#[async_trait]
pub trait CourseProgressRepository: Send + Sync {
    /// Fetch the summary for a learner/course pair, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on lookup failure.
    async fn find_summary(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError>;

    /// Write the summary row and copy its percentage into the enrollment's
    /// cached field in one atomic operation. The two values can never be
    /// observed to disagree.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no enrollment exists for the
    /// pair; nothing is written in that case.
    async fn store_summary(&self, summary: &CourseProgress) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY BACKEND ────────────────────────────────────────────────────────
//

#[derive(Default)]
struct InMemoryState {
    enrollments: HashMap<(LearnerId, CourseId), Enrollment>,
    units: HashMap<UnitId, Unit>,
    items: HashMap<(LearnerId, UnitId), ItemProgress>,
    summaries: HashMap<(LearnerId, CourseId), CourseProgress>,
}

/// Simple in-memory backend for testing and prototyping.
///
/// All four relations live behind one mutex so the summary write and the
/// enrollment cache update are a single atomic step, matching the SQLite
/// backend's transaction.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryStorage {
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.enrollments.insert(
            (enrollment.learner_id(), enrollment.course_id()),
            enrollment.clone(),
        );
        Ok(())
    }

    async fn get_enrollment(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Enrollment, StorageError> {
        let state = self.lock()?;
        state
            .enrollments
            .get(&(learner, course))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn delete_enrollment(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if state.enrollments.remove(&(learner, course)).is_none() {
            return Err(StorageError::NotFound);
        }
        state
            .items
            .retain(|(l, _), item| !(*l == learner && item.course_id() == course));
        state.summaries.remove(&(learner, course));
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStorage {
    async fn upsert_unit(&self, unit: &Unit) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.units.insert(unit.id(), unit.clone());
        Ok(())
    }

    async fn get_unit(&self, id: UnitId) -> Result<Unit, StorageError> {
        let state = self.lock()?;
        state.units.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn units_for_course(&self, course: CourseId) -> Result<Vec<Unit>, StorageError> {
        let state = self.lock()?;
        let mut units: Vec<Unit> = state
            .units
            .values()
            .filter(|u| u.course_id() == course)
            .cloned()
            .collect();
        units.sort_by_key(|u| (u.position(), u.id()));
        Ok(units)
    }
}

#[async_trait]
impl ItemProgressRepository for InMemoryStorage {
    async fn find_item(
        &self,
        learner: LearnerId,
        unit: UnitId,
    ) -> Result<Option<ItemProgress>, StorageError> {
        let state = self.lock()?;
        Ok(state.items.get(&(learner, unit)).cloned())
    }

    async fn items_for_course(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Vec<ItemProgress>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .items
            .values()
            .filter(|i| i.learner_id() == learner && i.course_id() == course)
            .cloned()
            .collect())
    }

    async fn insert_item(&self, item: &ItemProgress) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let key = (item.learner_id(), item.unit_id());
        if state.items.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        state.items.insert(key, item.clone());
        Ok(())
    }

    async fn update_item(
        &self,
        item: &ItemProgress,
        expected_revision: u32,
    ) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let key = (item.learner_id(), item.unit_id());
        match state.items.get(&key) {
            None => Err(StorageError::NotFound),
            Some(stored) if stored.revision() != expected_revision => Err(StorageError::Conflict),
            Some(_) => {
                state.items.insert(key, item.clone());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CourseProgressRepository for InMemoryStorage {
    async fn find_summary(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let state = self.lock()?;
        Ok(state.summaries.get(&(learner, course)).cloned())
    }

    async fn store_summary(&self, summary: &CourseProgress) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let key = (summary.learner_id(), summary.course_id());
        let Some(enrollment) = state.enrollments.get(&key) else {
            return Err(StorageError::NotFound);
        };
        let refreshed = Enrollment::from_persisted(
            enrollment.learner_id(),
            enrollment.course_id(),
            enrollment.started_at(),
            summary.percentage(),
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
        state.enrollments.insert(key, refreshed);
        state.summaries.insert(key, summary.clone());
        Ok(())
    }
}

/// Aggregates the engine's repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub items: Arc<dyn ItemProgressRepository>,
    pub summaries: Arc<dyn CourseProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryStorage::new();
        let enrollments: Arc<dyn EnrollmentRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let items: Arc<dyn ItemProgressRepository> = Arc::new(repo.clone());
        let summaries: Arc<dyn CourseProgressRepository> = Arc::new(repo);
        Self {
            enrollments,
            catalog,
            items,
            summaries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{EventKind, EventPayload, UnitKind};
    use course_core::time::fixed_now;

    fn build_unit(id: u64, course: u64, position: u32) -> Unit {
        Unit::new(
            UnitId::new(id),
            CourseId::new(course),
            format!("Unit {id}"),
            position,
            UnitKind::Video,
            Vec::new(),
            None,
        )
        .unwrap()
    }

    fn started_item(learner: u64, unit: u64, course: u64) -> ItemProgress {
        let mut item = ItemProgress::fresh(
            LearnerId::new(learner),
            UnitId::new(unit),
            CourseId::new(course),
            fixed_now(),
        );
        item.apply_event(
            EventKind::Start,
            &EventPayload::default(),
            UnitKind::Video,
            fixed_now(),
        )
        .unwrap();
        item
    }

    #[tokio::test]
    async fn insert_then_duplicate_insert_conflicts() {
        let repo = InMemoryStorage::new();
        let item = started_item(1, 10, 100);
        repo.insert_item(&item).await.unwrap();
        let err = repo.insert_item(&item).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn stale_revision_update_conflicts() {
        let repo = InMemoryStorage::new();
        let mut item = started_item(1, 10, 100);
        repo.insert_item(&item).await.unwrap();

        let stale_revision = item.revision();
        item.apply_event(
            EventKind::Complete,
            &EventPayload::default(),
            UnitKind::Video,
            fixed_now(),
        )
        .unwrap();
        repo.update_item(&item, stale_revision).await.unwrap();

        // A second writer still holding the old revision loses the race.
        let err = repo.update_item(&item, stale_revision).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn units_come_back_ordered_by_position() {
        let repo = InMemoryStorage::new();
        repo.upsert_unit(&build_unit(3, 1, 30)).await.unwrap();
        repo.upsert_unit(&build_unit(1, 1, 10)).await.unwrap();
        repo.upsert_unit(&build_unit(2, 1, 20)).await.unwrap();
        repo.upsert_unit(&build_unit(9, 2, 5)).await.unwrap();

        let units = repo.units_for_course(CourseId::new(1)).await.unwrap();
        let positions: Vec<u32> = units.iter().map(Unit::position).collect();
        assert_eq!(positions, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn store_summary_syncs_enrollment_cache() {
        let repo = InMemoryStorage::new();
        let learner = LearnerId::new(1);
        let course = CourseId::new(100);
        repo.upsert_enrollment(&Enrollment::new(learner, course, fixed_now()))
            .await
            .unwrap();

        let summary = CourseProgress::compute(learner, course, 1, 2, Some(fixed_now())).unwrap();
        repo.store_summary(&summary).await.unwrap();

        let enrollment = repo.get_enrollment(learner, course).await.unwrap();
        assert_eq!(enrollment.progress_percent(), 50.0);
        let stored = repo.find_summary(learner, course).await.unwrap().unwrap();
        assert_eq!(stored.percentage(), 50.0);
    }

    #[tokio::test]
    async fn store_summary_without_enrollment_is_not_found() {
        let repo = InMemoryStorage::new();
        let summary =
            CourseProgress::compute(LearnerId::new(1), CourseId::new(1), 0, 2, None).unwrap();
        let err = repo.store_summary(&summary).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn unenrollment_cascades_cleanup() {
        let repo = InMemoryStorage::new();
        let learner = LearnerId::new(1);
        let course = CourseId::new(100);
        repo.upsert_enrollment(&Enrollment::new(learner, course, fixed_now()))
            .await
            .unwrap();
        repo.insert_item(&started_item(1, 10, 100)).await.unwrap();
        let summary = CourseProgress::compute(learner, course, 0, 1, None).unwrap();
        repo.store_summary(&summary).await.unwrap();

        repo.delete_enrollment(learner, course).await.unwrap();

        assert!(matches!(
            repo.get_enrollment(learner, course).await.unwrap_err(),
            StorageError::NotFound
        ));
        assert!(
            repo.find_item(learner, UnitId::new(10))
                .await
                .unwrap()
                .is_none()
        );
        assert!(repo.find_summary(learner, course).await.unwrap().is_none());
    }
}
