//! Batch execution engine for JobHub.
//!
//! This crate provides:
//! - Pluggable record processors keyed by job type
//! - A thread-safe work queue between the scheduler and the worker pool
//! - A fixed-size worker pool that runs processors with retries and timeouts
//! - A scheduler that admits jobs by priority, dispatches their records
//!   under a per-job concurrency cap, and drives the job state machine

pub mod dispatch;
pub mod engine;
pub mod pool;
pub mod processor;
pub mod processors;
pub mod queue;
pub mod scheduler;

pub use engine::{Engine, EngineHandle};
pub use pool::WorkerPool;
pub use processor::{ProcessContext, ProcessError, ProcessorRegistry, RecordProcessor};
pub use scheduler::JobScheduler;
