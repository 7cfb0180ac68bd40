//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobhub_core::types::JobId;
use jobhub_entity::job::{Job, JobPriority, JobStatus, JobType};

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Returned by job submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    /// The new job's id.
    pub job_id: JobId,
}

/// Job snapshot as seen by API clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    /// Job ID.
    pub id: JobId,
    /// Job type.
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Job name.
    pub name: String,
    /// Requested priority.
    pub priority: JobPriority,
    /// Priority after starvation promotion.
    pub effective_priority: JobPriority,
    /// Submitter.
    pub created_by: String,
    /// Status.
    pub status: JobStatus,
    /// Record count.
    pub total: u64,
    /// Whether the record count is final.
    pub total_known: bool,
    /// Records with an outcome.
    pub processed: u64,
    /// Successful records.
    pub succeeded: u64,
    /// Failed records.
    pub failed: u64,
    /// Completion percentage.
    pub progress_percent: f64,
    /// Estimated seconds to completion while running.
    pub estimated_completion_seconds: Option<u64>,
    /// Attempt generation.
    pub generation: u32,
    /// Why the job failed.
    pub failure_reason: Option<String>,
    /// Store revision.
    pub revision: u64,
    /// Created at.
    pub created_at: DateTime<Utc>,
    /// Started at.
    pub started_at: Option<DateTime<Utc>>,
    /// Finished at.
    pub finished_at: Option<DateTime<Utc>>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let estimated_completion_seconds = job.estimated_completion_seconds(Utc::now());
        Self {
            id: job.id,
            job_type: job.job_type,
            progress_percent: (job.progress_percent() * 10.0).round() / 10.0,
            estimated_completion_seconds,
            name: job.name,
            priority: job.priority,
            effective_priority: job.effective_priority,
            created_by: job.created_by,
            status: job.status,
            total: job.total,
            total_known: job.total_known,
            processed: job.processed,
            succeeded: job.succeeded,
            failed: job.failed,
            generation: job.generation,
            failure_reason: job.failure_reason,
            revision: job.revision,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            updated_at: job.updated_at,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Seconds since the server started.
    pub uptime_seconds: u64,
}
