//! Job control and observation services.

pub mod control;
pub mod ingest;
pub mod progress;
pub mod service;
pub mod stats;

pub use ingest::{RecordSource, RecordStream};
pub use progress::ProgressStream;
pub use service::{JobService, SubmitJob};
pub use stats::JobStats;
