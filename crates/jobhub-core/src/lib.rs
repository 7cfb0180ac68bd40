//! # jobhub-core
//!
//! Core crate for JobHub. Contains configuration schemas, typed
//! identifiers, and the unified error system shared by the batch engine,
//! its HTTP surface, and the CLI.
//!
//! This crate has **no** internal dependencies on other JobHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
