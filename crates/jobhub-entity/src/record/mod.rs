//! Input records and their per-record outcomes.

pub mod model;
pub mod outcome;

pub use model::{Record, RecordId};
pub use outcome::{ErrorClass, OutcomeStatus, RecordOutcome};
