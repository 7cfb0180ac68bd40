//! Batch job domain entities.

pub mod kind;
pub mod model;
pub mod status;

pub use kind::JobType;
pub use model::{CreateJob, Job};
pub use status::{JobPriority, JobStatus};
