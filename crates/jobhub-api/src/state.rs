//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use jobhub_core::config::AppConfig;
use jobhub_service::JobService;

/// Shared state threaded through every route.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Job control and observation.
    pub jobs: Arc<JobService>,
    /// When the server started, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Creates the application state.
    pub fn new(config: Arc<AppConfig>, jobs: Arc<JobService>) -> Self {
        Self {
            config,
            jobs,
            started_at: Instant::now(),
        }
    }
}
