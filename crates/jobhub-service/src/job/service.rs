//! Job submission and queries.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use jobhub_core::error::AppError;
use jobhub_core::types::JobId;
use jobhub_entity::job::{CreateJob, Job, JobPriority, JobStatus, JobType};
use jobhub_entity::record::{OutcomeStatus, Record, RecordOutcome};
use jobhub_store::JobStore;
use jobhub_worker::{Engine, JobScheduler, ProcessorRegistry};

use super::ingest::{self, RecordSource};

/// Longest accepted job name, in characters.
pub const MAX_NAME_LEN: usize = 200;

/// Longest accepted record id, in bytes.
pub const MAX_RECORD_ID_LEN: usize = 256;

/// Orchestrates job submission, control and observation.
#[derive(Debug, Clone)]
pub struct JobService {
    /// Job state store.
    pub(crate) store: Arc<dyn JobStore>,
    /// Scheduler to wake and halt.
    pub(crate) scheduler: Arc<JobScheduler>,
    /// Registered processors, for submission validation.
    registry: Arc<ProcessorRegistry>,
    /// Worker pool size, reported in statistics.
    pub(crate) pool_size: usize,
}

/// Request to submit a new job.
#[derive(Debug)]
pub struct SubmitJob {
    /// Job type.
    pub job_type: JobType,
    /// Human-readable name.
    pub name: String,
    /// Requested priority.
    pub priority: JobPriority,
    /// Submitter identity.
    pub created_by: String,
    /// Where the records come from.
    pub source: RecordSource,
}

impl JobService {
    /// Creates a job service over a wired engine.
    pub fn new(engine: &Engine) -> Self {
        Self {
            store: Arc::clone(&engine.store),
            scheduler: Arc::clone(&engine.scheduler),
            registry: Arc::clone(&engine.registry),
            pool_size: engine.config.resolved_pool_size(),
        }
    }

    /// Validates and queues a new job.
    ///
    /// Inline sources are stored together with the job. Streaming sources
    /// are ingested in the background; the job is not admitted until the
    /// stream ends and its total is known.
    pub async fn submit(&self, req: SubmitJob) -> Result<JobId, AppError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Job name cannot be empty"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::validation(format!(
                "Job name cannot exceed {MAX_NAME_LEN} characters"
            )));
        }
        let created_by = req.created_by.trim();
        if created_by.is_empty() {
            return Err(AppError::validation("created_by cannot be empty"));
        }
        if !self.registry.has_processor(req.job_type) {
            return Err(AppError::validation(format!(
                "No processor registered for job type '{}'",
                req.job_type
            )));
        }

        let mut create = CreateJob {
            job_type: req.job_type,
            name: name.to_string(),
            priority: req.priority,
            created_by: created_by.to_string(),
            total: 0,
            total_known: false,
        };

        match req.source {
            RecordSource::Inline(records) => {
                if records.is_empty() {
                    return Err(AppError::validation("A job must contain at least one record"));
                }
                validate_records(&records)?;

                create.total = records.len() as u64;
                create.total_known = true;
                let job = Job::new(create, Utc::now());
                let id = self.store.create_with_records(job, records).await?;

                info!(
                    job_id = %id,
                    job_type = %req.job_type,
                    priority = %req.priority,
                    "Job submitted"
                );
                self.scheduler.wake();
                Ok(id)
            }
            RecordSource::Stream(stream) => {
                let job = Job::new(create, Utc::now());
                let id = self.store.create(job).await?;

                info!(
                    job_id = %id,
                    job_type = %req.job_type,
                    priority = %req.priority,
                    "Job submitted, ingesting records from stream"
                );
                ingest::spawn_ingestion(
                    Arc::clone(&self.store),
                    Arc::clone(&self.scheduler),
                    id,
                    stream,
                );
                Ok(id)
            }
        }
    }

    /// Returns the current job snapshot.
    pub async fn get_status(&self, id: JobId) -> Result<Job, AppError> {
        self.store.get(id).await
    }

    /// Lists jobs newest first, optionally filtered by status.
    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>, AppError> {
        let mut jobs = self.store.list().await?;
        if let Some(status) = status {
            jobs.retain(|job| job.status == status);
        }
        Ok(jobs)
    }

    /// Returns the latest outcome of every record that has one, in record
    /// submission order. With `errors_only`, successes are left out.
    pub async fn list_outcomes(
        &self,
        id: JobId,
        errors_only: bool,
    ) -> Result<Vec<RecordOutcome>, AppError> {
        let mut latest = self.store.latest_outcomes(id).await?;
        let records = self.store.records(id).await?;

        Ok(records
            .iter()
            .filter_map(|record| latest.remove(&record.id))
            .filter(|outcome| !errors_only || outcome.status == OutcomeStatus::Error)
            .collect())
    }

    /// Returns the full append-only outcome log, including superseded
    /// attempts.
    pub async fn outcome_history(&self, id: JobId) -> Result<Vec<RecordOutcome>, AppError> {
        self.store.outcomes(id).await
    }
}

/// Rejects empty, oversized or duplicate record ids.
pub(crate) fn validate_records(records: &[Record]) -> Result<(), AppError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        let id = record.id.as_str();
        if id.trim().is_empty() {
            return Err(AppError::validation("Record id cannot be empty"));
        }
        if id.len() > MAX_RECORD_ID_LEN {
            return Err(AppError::validation(format!(
                "Record id cannot exceed {MAX_RECORD_ID_LEN} bytes"
            )));
        }
        if !seen.insert(id) {
            return Err(AppError::validation(format!("Duplicate record id '{id}'")));
        }
    }
    Ok(())
}
