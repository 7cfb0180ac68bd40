//! JSON snapshot persistence for [`MemoryJobStore`].
//!
//! The snapshot is written to a temporary file and renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing;

use jobhub_core::error::AppError;
use jobhub_core::result::AppResult;
use jobhub_entity::job::Job;
use jobhub_entity::record::{Record, RecordOutcome};

use crate::memory::MemoryJobStore;

/// One job with its records and outcome log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredJob {
    /// Job metadata and counters.
    pub job: Job,
    /// Input records.
    pub records: Vec<Record>,
    /// Append-only outcome log.
    pub outcomes: Vec<RecordOutcome>,
}

/// Serialized form of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Every stored job.
    pub jobs: Vec<StoredJob>,
}

/// Read a snapshot file. A missing file yields `None`.
pub async fn load(path: &Path) -> AppResult<Option<StoreSnapshot>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AppError::with_source(
                jobhub_core::error::ErrorKind::Storage,
                format!("Failed to read snapshot {}", path.display()),
                e,
            ));
        }
    };
    let snapshot = serde_json::from_slice(&bytes)?;
    Ok(Some(snapshot))
}

/// Write a snapshot file atomically.
pub async fn save(snapshot: &StoreSnapshot, path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let bytes = serde_json::to_vec(snapshot)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Open a store from `path`, or start empty if no snapshot exists yet.
pub async fn open(path: &Path) -> AppResult<MemoryJobStore> {
    match load(path).await? {
        Some(snapshot) => {
            tracing::info!(
                path = %path.display(),
                jobs = snapshot.jobs.len(),
                "Loaded job store snapshot"
            );
            Ok(MemoryJobStore::from_snapshot(snapshot))
        }
        None => Ok(MemoryJobStore::new()),
    }
}

/// Flush the store to `path` every `interval` until `shutdown` flips,
/// then flush once more.
pub fn spawn_snapshot_task(
    store: MemoryJobStore,
    path: PathBuf,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
            if let Err(e) = save(&store.snapshot(), &path).await {
                tracing::error!("Failed to write job store snapshot: {}", e);
            }
        }

        match save(&store.snapshot(), &path).await {
            Ok(()) => tracing::info!(path = %path.display(), "Final job store snapshot written"),
            Err(e) => tracing::error!("Failed to write final job store snapshot: {}", e),
        }
    })
}
