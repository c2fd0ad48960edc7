use thiserror::Error;

use crate::model::{EnrollmentError, ProgressError, SummaryError, UnitError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
}
