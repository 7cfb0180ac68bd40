//! HTTP integration tests driving the full router in-process.

mod helpers;
mod jobs_test;
