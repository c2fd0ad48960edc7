use std::collections::HashMap;
use std::sync::Arc;

use course_core::model::{
    AccessDecision, ItemProgress, LearnerId, Prerequisite, Reason, Unit, UnitId,
};
use course_core::time::Clock;
use storage::repository::{EnrollmentRepository, ItemProgressRepository, StorageError};

use crate::catalog::CatalogReader;
use crate::error::GuardError;

/// Gating behavior knobs.
#[derive(Debug, Clone, Copy)]
pub struct GuardConfig {
    /// When a unit declares no explicit prerequisites, treat its immediate
    /// predecessor by position as an implicit completion prerequisite.
    pub sequential_gating: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            sequential_gating: true,
        }
    }
}

/// Decides whether a learner may currently open a unit.
///
/// A pure read over the enrollment, catalog, and ledger; takes no locks and
/// mutates nothing. It reads the ledger directly rather than the cached
/// summary, so gating decisions never act on a stale percentage.
#[derive(Clone)]
pub struct AccessGuard {
    clock: Clock,
    enrollments: Arc<dyn EnrollmentRepository>,
    items: Arc<dyn ItemProgressRepository>,
    catalog: CatalogReader,
    config: GuardConfig,
}

impl AccessGuard {
    #[must_use]
    pub fn new(
        clock: Clock,
        enrollments: Arc<dyn EnrollmentRepository>,
        items: Arc<dyn ItemProgressRepository>,
        catalog: CatalogReader,
        config: GuardConfig,
    ) -> Self {
        Self {
            clock,
            enrollments,
            items,
            catalog,
            config,
        }
    }

    /// Evaluate access for a learner on a unit.
    ///
    /// A missing enrollment short-circuits with the single advisory reason
    /// `NotEnrolled`; otherwise every applicable prerequisite and drip
    /// reason is collected so callers can render them all.
    ///
    /// # Errors
    ///
    /// Returns `GuardError` if the unit is unknown or a lookup fails.
    pub async fn evaluate(
        &self,
        learner: LearnerId,
        unit_id: UnitId,
    ) -> Result<AccessDecision, GuardError> {
        let unit = self.catalog.unit(unit_id).await?;

        let enrollment = match self
            .enrollments
            .get_enrollment(learner, unit.course_id())
            .await
        {
            Ok(enrollment) => enrollment,
            Err(StorageError::NotFound) => {
                return Ok(AccessDecision::denied(vec![Reason::NotEnrolled]));
            }
            Err(e) => return Err(GuardError::Storage(e)),
        };

        let course_units = self.catalog.ordered_units(unit.course_id()).await?;
        let titles: HashMap<UnitId, &str> =
            course_units.iter().map(|u| (u.id(), u.title())).collect();

        let mut reasons = Vec::new();

        for prereq in self.effective_prerequisites(&unit, &course_units) {
            let item = self.items.find_item(learner, prereq.unit_id).await?;
            if !prerequisite_satisfied(&prereq, item.as_ref()) {
                let title = match titles.get(&prereq.unit_id) {
                    Some(t) => (*t).to_owned(),
                    // Explicit prerequisites may name a unit from another
                    // course.
                    None => self.catalog.unit(prereq.unit_id).await?.title().to_owned(),
                };
                reasons.push(Reason::LockedByPrereq {
                    unit_id: prereq.unit_id,
                    title,
                    min_score: prereq.min_score,
                });
            }
        }

        if let Some(delay) = unit.release_delay() {
            let available_at = enrollment.started_at() + delay;
            if self.clock.now() < available_at {
                reasons.push(Reason::LockedByDrip { available_at });
            }
        }

        Ok(AccessDecision::from_reasons(reasons))
    }

    /// The unit's explicit prerequisite list, or the implicit
    /// previous-by-position prerequisite under sequential gating.
    fn effective_prerequisites(&self, unit: &Unit, course_units: &[Unit]) -> Vec<Prerequisite> {
        if !unit.prerequisites().is_empty() {
            return unit.prerequisites().to_vec();
        }
        if !self.config.sequential_gating {
            return Vec::new();
        }
        course_units
            .iter()
            .filter(|u| u.position() < unit.position())
            .next_back()
            .map(|prev| vec![Prerequisite::completion_of(prev.id())])
            .unwrap_or_default()
    }
}

fn prerequisite_satisfied(prereq: &Prerequisite, item: Option<&ItemProgress>) -> bool {
    let Some(item) = item else {
        return false;
    };
    if !item.status().counts_as_complete() {
        return false;
    }
    match prereq.min_score {
        None => true,
        Some(min) => item.score().is_some_and(|s| s >= min),
    }
}
