use std::sync::Arc;

use course_core::model::{
    CourseId, EventKind, EventPayload, ItemProgress, LearnerId, UnitId,
};
use course_core::time::Clock;
use storage::repository::{EnrollmentRepository, ItemProgressRepository, StorageError};

use crate::aggregator::Aggregator;
use crate::catalog::CatalogReader;
use crate::error::LedgerError;

/// Bounded retries for a contended per-key upsert before surfacing
/// `LedgerError::Unavailable`.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Records discrete progress events against per-unit item rows.
///
/// Sole writer of `ItemProgress`. Concurrent events for the same
/// `(learner, unit)` key serialize through the storage layer's
/// compare-and-swap: a lost race re-reads the row and reapplies the
/// transition, so interleavings can never produce an inconsistent status.
#[derive(Clone)]
pub struct ProgressLedger {
    clock: Clock,
    enrollments: Arc<dyn EnrollmentRepository>,
    items: Arc<dyn ItemProgressRepository>,
    catalog: CatalogReader,
    aggregator: Aggregator,
}

impl ProgressLedger {
    #[must_use]
    pub fn new(
        clock: Clock,
        enrollments: Arc<dyn EnrollmentRepository>,
        items: Arc<dyn ItemProgressRepository>,
        catalog: CatalogReader,
        aggregator: Aggregator,
    ) -> Self {
        Self {
            clock,
            enrollments,
            items,
            catalog,
            aggregator,
        }
    }

    /// Record one event for a learner on a unit and return the resulting row.
    ///
    /// Refuses events from non-enrolled learners and for units that do not
    /// belong to the named course; malformed payloads mutate nothing. After
    /// a successful write the course summary is recomputed synchronously, so
    /// the summary never reflects a ledger state older than this write.
    ///
    /// # Errors
    ///
    /// - `LedgerError::NotEnrolled` if no enrollment exists for the pair.
    /// - `LedgerError::Catalog` if the unit is unknown.
    /// - `LedgerError::UnitNotInCourse` on a course/unit mismatch.
    /// - `LedgerError::InvalidEvent` for malformed payloads.
    /// - `LedgerError::Unavailable` when write contention persists past the
    ///   retry budget.
    /// - `LedgerError::Recompute` if the event was recorded but the summary
    ///   recompute failed; retrying the event is safe.
    pub async fn record_event(
        &self,
        learner: LearnerId,
        course: CourseId,
        unit_id: UnitId,
        kind: EventKind,
        payload: &EventPayload,
    ) -> Result<ItemProgress, LedgerError> {
        let unit = self.catalog.unit(unit_id).await?;
        if unit.course_id() != course {
            return Err(LedgerError::UnitNotInCourse {
                unit: unit_id,
                course,
            });
        }

        match self.enrollments.get_enrollment(learner, course).await {
            Ok(_) => {}
            Err(StorageError::NotFound) => {
                return Err(LedgerError::NotEnrolled(learner, course));
            }
            Err(e) => return Err(LedgerError::Storage(e)),
        }

        let mut attempts = 0;
        let item = loop {
            attempts += 1;
            let now = self.clock.now();
            let existing = self.items.find_item(learner, unit_id).await?;

            let result = match existing {
                None => {
                    let mut item = ItemProgress::fresh(learner, unit_id, course, now);
                    item.apply_event(kind, payload, unit.kind(), now)?;
                    if item.revision() == 0 {
                        // Nothing to persist for a no-op on a fresh key.
                        break item;
                    }
                    self.items.insert_item(&item).await.map(|()| item)
                }
                Some(mut item) => {
                    let expected = item.revision();
                    let changed = item.apply_event(kind, payload, unit.kind(), now)?;
                    if !changed {
                        // Idempotent no-op: Start on a started row, Complete
                        // on a passed quiz.
                        break item;
                    }
                    self.items.update_item(&item, expected).await.map(|()| item)
                }
            };

            match result {
                Ok(item) => break item,
                Err(StorageError::Conflict) if attempts < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(%learner, %unit_id, attempts, "item upsert lost a race, retrying");
                }
                Err(StorageError::Conflict) => {
                    tracing::warn!(%learner, %unit_id, attempts, "item upsert contention persisted");
                    return Err(LedgerError::Unavailable(attempts));
                }
                Err(e) => return Err(LedgerError::Storage(e)),
            }
        };

        self.aggregator
            .recompute(learner, course)
            .await
            .map_err(LedgerError::Recompute)?;

        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use course_core::model::{Enrollment, ItemStatus, Unit, UnitKind};
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::Storage;

    /// Item repository whose writes always lose the compare-and-swap race.
    struct ContendedItems {
        inner: Arc<dyn ItemProgressRepository>,
        writes: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ItemProgressRepository for ContendedItems {
        async fn find_item(
            &self,
            learner: LearnerId,
            unit: UnitId,
        ) -> Result<Option<ItemProgress>, StorageError> {
            self.inner.find_item(learner, unit).await
        }

        async fn items_for_course(
            &self,
            learner: LearnerId,
            course: CourseId,
        ) -> Result<Vec<ItemProgress>, StorageError> {
            self.inner.items_for_course(learner, course).await
        }

        async fn insert_item(&self, _item: &ItemProgress) -> Result<(), StorageError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Conflict)
        }

        async fn update_item(
            &self,
            _item: &ItemProgress,
            _expected_revision: u32,
        ) -> Result<(), StorageError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Conflict)
        }
    }

    const LEARNER: LearnerId = LearnerId::new(1);
    const COURSE: CourseId = CourseId::new(100);

    async fn seed_unit(storage: &Storage, id: u64, position: u32, kind: UnitKind) {
        let unit = Unit::new(
            UnitId::new(id),
            COURSE,
            format!("Unit {id}"),
            position,
            kind,
            Vec::new(),
            None,
        )
        .unwrap();
        storage.catalog.upsert_unit(&unit).await.unwrap();
    }

    async fn build_ledger(storage: &Storage) -> ProgressLedger {
        storage
            .enrollments
            .upsert_enrollment(&Enrollment::new(LEARNER, COURSE, fixed_now()))
            .await
            .unwrap();
        let catalog = CatalogReader::new(Arc::clone(&storage.catalog));
        let aggregator = Aggregator::new(
            catalog.clone(),
            Arc::clone(&storage.items),
            Arc::clone(&storage.summaries),
        );
        ProgressLedger::new(
            fixed_clock(),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.items),
            catalog,
            aggregator,
        )
    }

    #[tokio::test]
    async fn start_creates_in_progress_row() {
        let storage = Storage::in_memory();
        seed_unit(&storage, 1, 10, UnitKind::Video).await;
        let ledger = build_ledger(&storage).await;

        let item = ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(1),
                EventKind::Start,
                &EventPayload::default(),
            )
            .await
            .unwrap();
        assert_eq!(item.status(), ItemStatus::InProgress);
    }

    #[tokio::test]
    async fn start_after_complete_keeps_completed() {
        let storage = Storage::in_memory();
        seed_unit(&storage, 1, 10, UnitKind::Video).await;
        let ledger = build_ledger(&storage).await;

        ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(1),
                EventKind::Complete,
                &EventPayload::default(),
            )
            .await
            .unwrap();
        let item = ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(1),
                EventKind::Start,
                &EventPayload::default(),
            )
            .await
            .unwrap();
        assert_eq!(item.status(), ItemStatus::Completed);
    }

    #[tokio::test]
    async fn event_for_non_enrolled_learner_is_refused() {
        let storage = Storage::in_memory();
        seed_unit(&storage, 1, 10, UnitKind::Video).await;
        let ledger = build_ledger(&storage).await;

        let stranger = LearnerId::new(99);
        let err = ledger
            .record_event(
                stranger,
                COURSE,
                UnitId::new(1),
                EventKind::Start,
                &EventPayload::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotEnrolled(l, c) if l == stranger && c == COURSE));
        assert!(
            storage
                .items
                .find_item(stranger, UnitId::new(1))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unknown_unit_is_refused() {
        let storage = Storage::in_memory();
        let ledger = build_ledger(&storage).await;

        let err = ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(404),
                EventKind::Start,
                &EventPayload::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Catalog(_)));
    }

    #[tokio::test]
    async fn passed_without_score_mutates_nothing() {
        let storage = Storage::in_memory();
        seed_unit(&storage, 1, 10, UnitKind::Quiz).await;
        let ledger = build_ledger(&storage).await;

        let err = ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(1),
                EventKind::Passed,
                &EventPayload::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEvent(_)));
        assert!(
            storage
                .items
                .find_item(LEARNER, UnitId::new(1))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn quiz_retry_overwrites_latest_attempt() {
        let storage = Storage::in_memory();
        seed_unit(&storage, 1, 10, UnitKind::Quiz).await;
        let ledger = build_ledger(&storage).await;

        ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(1),
                EventKind::Failed,
                &EventPayload::score(40.0),
            )
            .await
            .unwrap();
        let item = ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(1),
                EventKind::Passed,
                &EventPayload::score(85.0),
            )
            .await
            .unwrap();
        assert_eq!(item.status(), ItemStatus::Passed);
        assert_eq!(item.score(), Some(85.0));
    }

    #[tokio::test]
    async fn successful_event_triggers_summary_recompute() {
        let storage = Storage::in_memory();
        seed_unit(&storage, 1, 10, UnitKind::Video).await;
        seed_unit(&storage, 2, 20, UnitKind::Video).await;
        let ledger = build_ledger(&storage).await;

        ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(1),
                EventKind::Complete,
                &EventPayload::default(),
            )
            .await
            .unwrap();

        let summary = storage
            .summaries
            .find_summary(LEARNER, COURSE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.percentage(), 50.0);
        let enrollment = storage
            .enrollments
            .get_enrollment(LEARNER, COURSE)
            .await
            .unwrap();
        assert_eq!(enrollment.progress_percent(), 50.0);
    }

    #[tokio::test]
    async fn unit_from_another_course_is_refused() {
        let storage = Storage::in_memory();
        let foreign = Unit::new(
            UnitId::new(7),
            CourseId::new(200),
            "Foreign",
            10,
            UnitKind::Video,
            Vec::new(),
            None,
        )
        .unwrap();
        storage.catalog.upsert_unit(&foreign).await.unwrap();
        let ledger = build_ledger(&storage).await;

        let err = ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(7),
                EventKind::Start,
                &EventPayload::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnitNotInCourse { .. }));
    }

    #[tokio::test]
    async fn persistent_write_contention_surfaces_unavailable() {
        let storage = Storage::in_memory();
        seed_unit(&storage, 1, 10, UnitKind::Video).await;
        storage
            .enrollments
            .upsert_enrollment(&Enrollment::new(LEARNER, COURSE, fixed_now()))
            .await
            .unwrap();
        let catalog = CatalogReader::new(Arc::clone(&storage.catalog));
        let aggregator = Aggregator::new(
            catalog.clone(),
            Arc::clone(&storage.items),
            Arc::clone(&storage.summaries),
        );
        let items = Arc::new(ContendedItems {
            inner: Arc::clone(&storage.items),
            writes: AtomicU32::new(0),
        });
        let ledger = ProgressLedger::new(
            fixed_clock(),
            Arc::clone(&storage.enrollments),
            Arc::clone(&items) as Arc<dyn ItemProgressRepository>,
            catalog,
            aggregator,
        );

        let err = ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(1),
                EventKind::Start,
                &EventPayload::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(3)));
        assert_eq!(items.writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recompute_failure_leaves_the_recorded_event_in_place() {
        let storage = Storage::in_memory();
        // Two units share a position, so ordering fails during the
        // post-write recompute.
        seed_unit(&storage, 1, 10, UnitKind::Video).await;
        seed_unit(&storage, 2, 10, UnitKind::Video).await;
        let ledger = build_ledger(&storage).await;

        let err = ledger
            .record_event(
                LEARNER,
                COURSE,
                UnitId::new(1),
                EventKind::Complete,
                &EventPayload::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Recompute(_)));

        let item = storage
            .items
            .find_item(LEARNER, UnitId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.status(), ItemStatus::Completed);
        assert!(
            storage
                .summaries
                .find_summary(LEARNER, COURSE)
                .await
                .unwrap()
                .is_none()
        );
    }
}
