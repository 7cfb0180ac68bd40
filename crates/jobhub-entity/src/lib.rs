//! # jobhub-entity
//!
//! Domain models for the batch engine: jobs with their lifecycle state
//! machine and progress counters, input records, and per-record outcomes.

pub mod job;
pub mod record;

pub use job::{CreateJob, Job, JobPriority, JobStatus, JobType};
pub use record::{ErrorClass, OutcomeStatus, Record, RecordId, RecordOutcome};
