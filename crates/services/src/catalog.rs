use std::sync::Arc;

use course_core::model::{CourseId, Unit, UnitId};
use storage::repository::{CatalogRepository, StorageError};

use crate::error::CatalogError;

/// Read-only view of a course's ordered units.
///
/// The unit definitions are owned by an external catalog source; this
/// reader only validates ordering on the way out.
#[derive(Clone)]
pub struct CatalogReader {
    catalog: Arc<dyn CatalogRepository>,
}

impl CatalogReader {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Fetch a single unit by ID.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownUnit` if the unit does not exist.
    pub async fn unit(&self, id: UnitId) -> Result<Unit, CatalogError> {
        match self.catalog.get_unit(id).await {
            Ok(unit) => Ok(unit),
            Err(StorageError::NotFound) => Err(CatalogError::UnknownUnit(id)),
            Err(e) => Err(CatalogError::Storage(e)),
        }
    }

    /// Fetch all units of a course, ascending by position.
    ///
    /// Positions need not be contiguous but must be strictly increasing; a
    /// tie is a data error in the external catalog and is reported, never
    /// silently resolved.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::DuplicatePosition` on a position tie, or a
    /// wrapped storage error.
    pub async fn ordered_units(&self, course: CourseId) -> Result<Vec<Unit>, CatalogError> {
        let units = self.catalog.units_for_course(course).await?;
        for pair in units.windows(2) {
            if pair[0].position() == pair[1].position() {
                return Err(CatalogError::DuplicatePosition {
                    course,
                    position: pair[0].position(),
                });
            }
        }
        Ok(units)
    }

    /// The unit immediately before `unit` by position, if any.
    ///
    /// Used by the guard's sequential-gating default.
    ///
    /// # Errors
    ///
    /// Propagates ordering and storage errors from `ordered_units`.
    pub async fn predecessor(&self, unit: &Unit) -> Result<Option<Unit>, CatalogError> {
        let units = self.ordered_units(unit.course_id()).await?;
        Ok(units
            .into_iter()
            .filter(|u| u.position() < unit.position())
            .next_back())
    }
}
