use std::sync::Arc;

use serde::{Deserialize, Serialize};

use course_core::model::{
    AccessDecision, CourseId, CourseProgress, Enrollment, EventKind, EventPayload, ItemProgress,
    LearnerId, UnitId,
};
use course_core::time::Clock;
use storage::repository::{Storage, StorageError};

use crate::aggregator::Aggregator;
use crate::catalog::CatalogReader;
use crate::error::EngineError;
use crate::guard::{AccessGuard, GuardConfig};
use crate::ledger::ProgressLedger;

/// Inbound event shape submitted by the content-delivery layer for the
/// currently authenticated learner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventSubmission {
    pub course_id: CourseId,
    pub unit_id: UnitId,
    pub kind: EventKind,
    #[serde(default)]
    pub data: EventPayload,
}

/// Assembles the four engine components over a shared `Storage`.
#[derive(Clone)]
pub struct EngineServices {
    clock: Clock,
    storage: Storage,
    catalog: CatalogReader,
    ledger: ProgressLedger,
    aggregator: Aggregator,
    guard: AccessGuard,
}

impl EngineServices {
    /// Wire the engine over an existing storage backend.
    #[must_use]
    pub fn new(storage: Storage, clock: Clock, config: GuardConfig) -> Self {
        let catalog = CatalogReader::new(Arc::clone(&storage.catalog));
        let aggregator = Aggregator::new(
            catalog.clone(),
            Arc::clone(&storage.items),
            Arc::clone(&storage.summaries),
        );
        let ledger = ProgressLedger::new(
            clock,
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.items),
            catalog.clone(),
            aggregator.clone(),
        );
        let guard = AccessGuard::new(
            clock,
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.items),
            catalog.clone(),
            config,
        );
        Self {
            clock,
            storage,
            catalog,
            ledger,
            aggregator,
            guard,
        }
    }

    /// Engine over the in-memory backend, for tests and prototyping.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(Storage::in_memory(), clock, GuardConfig::default())
    }

    /// Engine backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` if connection or migrations fail.
    pub async fn sqlite(
        database_url: &str,
        clock: Clock,
        config: GuardConfig,
    ) -> Result<Self, EngineError> {
        Ok(Self::new(Storage::sqlite(database_url).await?, clock, config))
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogReader {
        &self.catalog
    }

    #[must_use]
    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    #[must_use]
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    #[must_use]
    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Enroll a learner in a course, anchoring drip timing at the current
    /// clock time. Enrolling twice returns the existing enrollment
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failure.
    pub async fn enroll(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Enrollment, EngineError> {
        match self.storage.enrollments.get_enrollment(learner, course).await {
            Ok(existing) => Ok(existing),
            Err(StorageError::NotFound) => {
                let enrollment = Enrollment::new(learner, course, self.clock.now());
                self.storage
                    .enrollments
                    .upsert_enrollment(&enrollment)
                    .await?;
                tracing::debug!(%learner, %course, "learner enrolled");
                Ok(enrollment)
            }
            Err(e) => Err(EngineError::Storage(e)),
        }
    }

    /// Remove an enrollment and, with it, the pair's ledger rows and
    /// summary.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage(StorageError::NotFound)` if the
    /// learner was not enrolled.
    pub async fn unenroll(&self, learner: LearnerId, course: CourseId) -> Result<(), EngineError> {
        self.storage
            .enrollments
            .delete_enrollment(learner, course)
            .await?;
        tracing::debug!(%learner, %course, "learner unenrolled");
        Ok(())
    }

    /// The inbound event interface: record one progress event for the
    /// authenticated learner.
    ///
    /// # Errors
    ///
    /// Propagates `LedgerError` wrapped in `EngineError`.
    pub async fn submit_event(
        &self,
        learner: LearnerId,
        submission: EventSubmission,
    ) -> Result<ItemProgress, EngineError> {
        let item = self
            .ledger
            .record_event(
                learner,
                submission.course_id,
                submission.unit_id,
                submission.kind,
                &submission.data,
            )
            .await?;
        Ok(item)
    }

    /// The guard query interface: may the learner open this unit right now?
    ///
    /// # Errors
    ///
    /// Propagates `GuardError` wrapped in `EngineError`.
    pub async fn check_access(
        &self,
        learner: LearnerId,
        unit: UnitId,
    ) -> Result<AccessDecision, EngineError> {
        Ok(self.guard.evaluate(learner, unit).await?)
    }

    /// The summary read interface: the derived course summary, if one has
    /// been computed.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failure.
    pub async fn course_summary(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Option<CourseProgress>, EngineError> {
        Ok(self.storage.summaries.find_summary(learner, course).await?)
    }

    /// The enrollment record with its cached percentage.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failure or a missing enrollment.
    pub async fn enrollment(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Enrollment, EngineError> {
        Ok(self
            .storage
            .enrollments
            .get_enrollment(learner, course)
            .await?)
    }
}
