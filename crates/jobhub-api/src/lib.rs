//! # jobhub-api
//!
//! HTTP API layer for JobHub built on Axum.
//!
//! Provides the job control and observation endpoints, the server-sent
//! progress stream, middleware (CORS, compression, logging), DTOs with
//! validation, and error mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use error::ApiError;
pub use state::AppState;
