//! # jobhub-store
//!
//! The job state store is the single source of truth for job status,
//! progress counters, and per-record outcomes. Every job mutation goes
//! through [`JobStore::compare_and_swap`]; a losing writer re-reads and
//! retries via [`update_job`] instead of overwriting.
//!
//! - **memory**: in-process store on [dashmap](https://crates.io/crates/dashmap),
//!   optionally persisted as a JSON snapshot file

pub mod memory;
pub mod snapshot;
pub mod store;
pub mod update;

pub use memory::MemoryJobStore;
pub use store::{JobStore, OutcomeAppend};
pub use update::update_job;
