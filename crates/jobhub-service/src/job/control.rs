//! Control operations: pause, resume, cancel, retry.
//!
//! Every operation is idempotent: asking for the state a job is already in
//! returns the current snapshot unchanged. Transitions the state machine
//! does not allow are rejected with `InvalidState`.

use chrono::Utc;
use tracing::info;

use jobhub_core::error::AppError;
use jobhub_core::types::JobId;
use jobhub_entity::job::{Job, JobStatus};
use jobhub_store::update_job;

use super::service::JobService;

fn rejected(op: &str, job: &Job) -> AppError {
    AppError::invalid_state(format!(
        "Cannot {op} job {} while it is {}",
        job.id, job.status
    ))
}

impl JobService {
    /// Suspends a running job. Records already in flight finish and are
    /// recorded; no new records are dispatched.
    pub async fn pause(&self, id: JobId) -> Result<Job, AppError> {
        let current = self.store.get(id).await?;
        match current.status {
            JobStatus::Paused => return Ok(current),
            JobStatus::Running => {}
            _ => return Err(rejected("pause", &current)),
        }

        self.scheduler.halt(id).await;
        let (job, changed) = update_job(self.store.as_ref(), id, |job| match job.status {
            JobStatus::Paused => Ok(false),
            JobStatus::Running => {
                job.transition(JobStatus::Paused, Utc::now())?;
                Ok(true)
            }
            _ => Err(rejected("pause", job)),
        })
        .await?;

        if changed {
            info!(job_id = %id, processed = job.processed, total = job.total, "Job paused");
        }
        Ok(job)
    }

    /// Puts a paused job back into admission ordering.
    pub async fn resume(&self, id: JobId) -> Result<Job, AppError> {
        let (job, changed) = update_job(self.store.as_ref(), id, |job| match job.status {
            JobStatus::Queued | JobStatus::Running => Ok(false),
            JobStatus::Paused => {
                job.transition(JobStatus::Queued, Utc::now())?;
                Ok(true)
            }
            _ => Err(rejected("resume", job)),
        })
        .await?;

        if changed {
            info!(job_id = %id, "Job resumed");
            self.scheduler.wake();
        }
        Ok(job)
    }

    /// Cancels a job that has not finished. In-flight records may still
    /// complete; their outcomes are kept for audit.
    pub async fn cancel(&self, id: JobId) -> Result<Job, AppError> {
        let current = self.store.get(id).await?;
        match current.status {
            JobStatus::Cancelled => return Ok(current),
            JobStatus::Completed | JobStatus::Failed => return Err(rejected("cancel", &current)),
            _ => {}
        }

        self.scheduler.halt(id).await;
        let (job, changed) = update_job(self.store.as_ref(), id, |job| match job.status {
            JobStatus::Cancelled => Ok(false),
            JobStatus::Queued | JobStatus::Running | JobStatus::Paused => {
                job.transition(JobStatus::Cancelled, Utc::now())?;
                Ok(true)
            }
            _ => Err(rejected("cancel", job)),
        })
        .await?;

        if changed {
            info!(
                job_id = %id,
                processed = job.processed,
                total = job.total,
                "Job cancelled"
            );
        }
        Ok(job)
    }

    /// Requeues a failed job as a new generation. Only records without a
    /// success outcome are processed again.
    pub async fn retry(&self, id: JobId) -> Result<Job, AppError> {
        let (job, _) = update_job(self.store.as_ref(), id, |job| {
            if job.status != JobStatus::Failed {
                return Err(rejected("retry", job));
            }
            if !job.total_known {
                return Err(AppError::invalid_state(format!(
                    "Cannot retry job {}: its records were never fully ingested",
                    job.id
                )));
            }
            job.transition(JobStatus::Queued, Utc::now())?;
            job.generation += 1;
            job.failure_reason = None;
            Ok(true)
        })
        .await?;

        info!(
            job_id = %id,
            generation = job.generation,
            remaining = job.total.saturating_sub(job.succeeded),
            "Job requeued for retry"
        );
        self.scheduler.wake();
        Ok(job)
    }
}
