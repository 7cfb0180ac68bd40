//! Request DTOs with validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use jobhub_core::error::AppError;
use jobhub_entity::job::{JobPriority, JobStatus, JobType};
use jobhub_entity::record::Record;
use jobhub_service::{RecordSource, SubmitJob};

/// Submit a new batch job.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitJobRequest {
    /// Job type.
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Job name.
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    /// Priority (default: normal).
    #[serde(default)]
    pub priority: JobPriority,
    /// Submitter identity.
    #[serde(default = "default_created_by")]
    #[validate(length(min = 1, max = 100))]
    pub created_by: String,
    /// Records to process.
    #[validate(length(min = 1, message = "At least one record is required"), nested)]
    pub records: Vec<RecordInput>,
}

/// One input record.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordInput {
    /// Record id, unique within the job.
    #[validate(length(min = 1, max = 256))]
    pub id: String,
    /// Opaque payload handed to the processor.
    #[serde(default)]
    pub payload: serde_json::Value,
}

fn default_created_by() -> String {
    "api".to_string()
}

impl From<SubmitJobRequest> for SubmitJob {
    fn from(req: SubmitJobRequest) -> Self {
        let records = req
            .records
            .into_iter()
            .map(|r| Record::new(r.id, r.payload))
            .collect();
        SubmitJob {
            job_type: req.job_type,
            name: req.name,
            priority: req.priority,
            created_by: req.created_by,
            source: RecordSource::Inline(records),
        }
    }
}

/// Query parameters for listing jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListJobsQuery {
    /// Optional status filter.
    pub status: Option<String>,
}

impl ListJobsQuery {
    /// Parses the status filter.
    pub fn status(&self) -> Result<Option<JobStatus>, AppError> {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<JobStatus>().map_err(AppError::validation))
            .transpose()
    }
}

/// Query parameters for listing record outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomesQuery {
    /// Only return error outcomes.
    #[serde(default)]
    pub errors_only: bool,
}
