mod access;
mod enrollment;
mod ids;
mod progress;
mod summary;
mod unit;

pub use access::{AccessDecision, Reason};
pub use enrollment::{Enrollment, EnrollmentError};
pub use ids::{CourseId, LearnerId, ParseIdError, UnitId};
pub use progress::{EventKind, EventPayload, ItemProgress, ItemStatus, ProgressError};
pub use summary::{CourseProgress, SummaryError};
pub use unit::{Prerequisite, Unit, UnitError, UnitKind};
