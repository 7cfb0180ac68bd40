//! Queue statistics for the summary view.

use serde::{Deserialize, Serialize};

use jobhub_core::error::AppError;
use jobhub_entity::job::JobStatus;

use super::service::JobService;

/// Job counts per status and record totals across all jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    /// All jobs in the store.
    pub total_jobs: u64,
    /// Jobs waiting for admission.
    pub queued: u64,
    /// Jobs being processed.
    pub running: u64,
    /// Suspended jobs.
    pub paused: u64,
    /// Finished jobs.
    pub completed: u64,
    /// Failed jobs.
    pub failed: u64,
    /// Cancelled jobs.
    pub cancelled: u64,
    /// Records across all jobs.
    pub records_total: u64,
    /// Records with a terminal outcome.
    pub records_processed: u64,
    /// Records that succeeded.
    pub records_succeeded: u64,
    /// Records that failed.
    pub records_failed: u64,
    /// Worker pool size.
    pub pool_size: usize,
}

impl JobService {
    /// Computes queue statistics.
    pub async fn stats(&self) -> Result<JobStats, AppError> {
        let jobs = self.store.list().await?;
        let mut stats = JobStats {
            pool_size: self.pool_size,
            ..JobStats::default()
        };

        for job in &jobs {
            stats.total_jobs += 1;
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Paused => stats.paused += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
            stats.records_total += job.total;
            stats.records_processed += job.processed;
            stats.records_succeeded += job.succeeded;
            stats.records_failed += job.failed;
        }

        Ok(stats)
    }
}
