//! Job state store configuration.

use serde::{Deserialize, Serialize};

/// Persistence settings for the job state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the JSON snapshot file. `None` keeps the store memory-only.
    #[serde(default)]
    pub snapshot_path: Option<String>,
    /// Interval in seconds between snapshot flushes.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            snapshot_interval_seconds: default_snapshot_interval(),
        }
    }
}

fn default_snapshot_interval() -> u64 {
    5
}
