//! # jobhub-service
//!
//! Control and observation layer for JobHub. [`JobService`] is the single
//! entry point callers use: it validates submissions, drives control
//! operations through the job state machine, and exposes status, progress
//! streams, outcome listings and queue statistics.
//!
//! Services follow constructor injection; every dependency is an `Arc`
//! handed over at construction time.

pub mod job;

pub use job::{JobService, JobStats, ProgressStream, RecordSource, RecordStream, SubmitJob};
