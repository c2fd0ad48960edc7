use std::collections::HashSet;
use std::sync::Arc;

use course_core::model::{CourseId, CourseProgress, LearnerId, Unit, UnitId};
use storage::repository::{CourseProgressRepository, ItemProgressRepository};

use crate::catalog::CatalogReader;
use crate::error::AggregatorError;

/// Recomputes a learner's whole-course summary from the ledger.
///
/// Sole writer of `CourseProgress` rows and of the enrollment's cached
/// percentage; both are written in one atomic storage operation so they
/// always reflect the same ledger snapshot.
#[derive(Clone)]
pub struct Aggregator {
    catalog: CatalogReader,
    items: Arc<dyn ItemProgressRepository>,
    summaries: Arc<dyn CourseProgressRepository>,
}

impl Aggregator {
    #[must_use]
    pub fn new(
        catalog: CatalogReader,
        items: Arc<dyn ItemProgressRepository>,
        summaries: Arc<dyn CourseProgressRepository>,
    ) -> Self {
        Self {
            catalog,
            items,
            summaries,
        }
    }

    /// Recompute and persist the summary for a learner/course pair.
    ///
    /// A unit counts as completed iff its status is `Completed` or `Passed`,
    /// and only units present in the course's current unit list are counted.
    /// Idempotent: an unchanged ledger snapshot yields an identical summary.
    ///
    /// # Errors
    ///
    /// Returns `AggregatorError` if the catalog or ledger cannot be read or
    /// the write fails; the previous summary is left intact in every error
    /// case.
    pub async fn recompute(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<CourseProgress, AggregatorError> {
        let units = self.catalog.ordered_units(course).await?;
        let unit_ids: HashSet<UnitId> = units.iter().map(Unit::id).collect();
        let items = self.items.items_for_course(learner, course).await?;

        let completed = items
            .iter()
            .filter(|i| unit_ids.contains(&i.unit_id()) && i.status().counts_as_complete())
            .count();
        let first_event_at = items.iter().map(|i| i.updated_at()).min();

        // Once a first-started timestamp has been published it sticks; the
        // minimum over updated_at drifts as rows are touched again.
        let previous = self.summaries.find_summary(learner, course).await?;
        let first_started_at = previous
            .as_ref()
            .and_then(CourseProgress::first_started_at)
            .or(first_event_at);

        let completed = u32::try_from(completed).unwrap_or(u32::MAX);
        let total = u32::try_from(units.len()).unwrap_or(u32::MAX);
        let summary = CourseProgress::compute(learner, course, completed, total, first_started_at)?;

        self.summaries.store_summary(&summary).await?;
        tracing::debug!(%learner, %course, percentage = summary.percentage(), "course summary recomputed");
        Ok(summary)
    }
}
