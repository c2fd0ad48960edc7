#![forbid(unsafe_code)]

pub mod aggregator;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod guard;
pub mod ledger;

pub use course_core::Clock;

pub use aggregator::Aggregator;
pub use catalog::CatalogReader;
pub use engine::{EngineServices, EventSubmission};
pub use error::{AggregatorError, CatalogError, EngineError, GuardError, LedgerError};
pub use guard::{AccessGuard, GuardConfig};
pub use ledger::ProgressLedger;
