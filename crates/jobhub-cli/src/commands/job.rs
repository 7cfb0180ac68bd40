//! Job submission, listing and control commands.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tokio::io::AsyncReadExt;

use jobhub_api::dto::request::{RecordInput, SubmitJobRequest};
use jobhub_api::dto::response::{JobResponse, SubmitJobResponse};
use jobhub_core::error::AppError;
use jobhub_entity::job::{JobPriority, JobStatus, JobType};
use jobhub_entity::record::{OutcomeStatus, RecordOutcome};

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

/// Arguments for `submit`
#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Job type
    #[arg(short = 't', long = "type")]
    pub job_type: JobType,
    /// Job name
    #[arg(short, long)]
    pub name: String,
    /// Priority
    #[arg(short, long, default_value = "normal")]
    pub priority: JobPriority,
    /// Submitter identity
    #[arg(long, default_value = "cli")]
    pub created_by: String,
    /// JSON file holding an array of `{ "id": ..., "payload": ... }`, or `-` for stdin
    pub records: PathBuf,
}

/// Arguments for `list`
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only show jobs with this status
    #[arg(short, long)]
    pub status: Option<JobStatus>,
}

/// A single job id
#[derive(Debug, Args)]
pub struct JobArg {
    /// Job ID
    pub id: String,
}

/// Arguments for `outcomes`
#[derive(Debug, Args)]
pub struct OutcomesArgs {
    /// Job ID
    pub id: String,
    /// Only show failed records
    #[arg(short, long)]
    pub errors_only: bool,
}

/// Job display row for table output
#[derive(Debug, Serialize, Tabled)]
pub struct JobRow {
    /// Job ID
    id: String,
    /// Name
    name: String,
    /// Type
    #[tabled(rename = "type")]
    job_type: String,
    /// Priority
    priority: String,
    /// Status
    status: String,
    /// Progress
    progress: String,
    /// Succeeded
    succeeded: u64,
    /// Failed
    failed: u64,
}

impl From<&JobResponse> for JobRow {
    fn from(job: &JobResponse) -> Self {
        let total = if job.total_known {
            job.total.to_string()
        } else {
            format!("{}+", job.total)
        };
        Self {
            id: job.id.to_string(),
            name: job.name.clone(),
            job_type: job.job_type.to_string(),
            priority: job.effective_priority.to_string(),
            status: job.status.to_string(),
            progress: format!("{}/{} ({:.1}%)", job.processed, total, job.progress_percent),
            succeeded: job.succeeded,
            failed: job.failed,
        }
    }
}

/// Outcome display row
#[derive(Debug, Serialize, Tabled)]
struct OutcomeRow {
    /// Record ID
    record: String,
    /// Status
    status: String,
    /// Generation
    generation: u32,
    /// Attempt
    attempt: u32,
    /// Error class
    class: String,
    /// Message
    message: String,
}

impl From<&RecordOutcome> for OutcomeRow {
    fn from(outcome: &RecordOutcome) -> Self {
        Self {
            record: outcome.record_id.to_string(),
            status: match outcome.status {
                OutcomeStatus::Success => "success".to_string(),
                OutcomeStatus::Error => "error".to_string(),
            },
            generation: outcome.generation,
            attempt: outcome.attempt,
            class: outcome
                .error_class
                .map(|c| c.to_string())
                .unwrap_or_default(),
            message: outcome.message.clone().unwrap_or_default(),
        }
    }
}

/// Print one job snapshot
pub fn print_job(job: &JobResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => output::print_json(job),
        OutputFormat::Table => {
            println!("Job {}", job.id);
            output::print_kv("Name", &job.name);
            output::print_kv("Type", job.job_type.as_str());
            output::print_kv("Status", job.status.as_str());
            output::print_kv(
                "Priority",
                &format!("{} (effective {})", job.priority, job.effective_priority),
            );
            output::print_kv("Created by", &job.created_by);
            output::print_kv(
                "Progress",
                &format!(
                    "{}/{} ({:.1}%)",
                    job.processed, job.total, job.progress_percent
                ),
            );
            output::print_kv("Succeeded", &job.succeeded.to_string());
            output::print_kv("Failed", &job.failed.to_string());
            output::print_kv("Generation", &job.generation.to_string());
            if let Some(eta) = job.estimated_completion_seconds {
                output::print_kv("ETA", &format!("{eta}s"));
            }
            if let Some(reason) = &job.failure_reason {
                output::print_kv("Failure reason", reason);
            }
            output::print_kv("Created at", &job.created_at.to_rfc3339());
            if let Some(finished) = job.finished_at {
                output::print_kv("Finished at", &finished.to_rfc3339());
            }
        }
    }
}

async fn read_records(path: &PathBuf) -> Result<Vec<RecordInput>, AppError> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::validation(format!("Cannot read {}: {e}", path.display()))
        })?
    };
    serde_json::from_str(&raw)
        .map_err(|e| AppError::validation(format!("Invalid records file: {e}")))
}

/// `submit`
pub async fn submit(
    client: &ApiClient,
    args: &SubmitArgs,
    format: OutputFormat,
) -> Result<(), AppError> {
    let records = read_records(&args.records).await?;
    let count = records.len();
    let request = SubmitJobRequest {
        job_type: args.job_type,
        name: args.name.clone(),
        priority: args.priority,
        created_by: args.created_by.clone(),
        records,
    };

    let response: SubmitJobResponse = client.post("/jobs", Some(&request)).await?;
    match format {
        OutputFormat::Json => output::print_json(&response),
        OutputFormat::Table => output::print_success(&format!(
            "Job {} queued with {count} records",
            response.job_id
        )),
    }
    Ok(())
}

/// `list`
pub async fn list(client: &ApiClient, args: &ListArgs, format: OutputFormat) -> Result<(), AppError> {
    let path = match args.status {
        Some(status) => format!("/jobs?status={status}"),
        None => "/jobs".to_string(),
    };
    let jobs: Vec<JobResponse> = client.get(&path).await?;
    match format {
        OutputFormat::Json => output::print_json(&jobs),
        OutputFormat::Table => {
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            output::print_list(&rows, format);
        }
    }
    Ok(())
}

/// `status`
pub async fn status(client: &ApiClient, arg: &JobArg, format: OutputFormat) -> Result<(), AppError> {
    let job: JobResponse = client.get(&format!("/jobs/{}", arg.id)).await?;
    print_job(&job, format);
    Ok(())
}

/// `pause`, `resume`, `cancel` and `retry`
pub async fn control(
    client: &ApiClient,
    arg: &JobArg,
    action: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let job: JobResponse = client
        .post::<(), _>(&format!("/jobs/{}/{action}", arg.id), None)
        .await?;
    match format {
        OutputFormat::Json => output::print_json(&job),
        OutputFormat::Table => {
            output::print_success(&format!("Job {} is now {}", job.id, job.status))
        }
    }
    Ok(())
}

/// `outcomes`
pub async fn outcomes(
    client: &ApiClient,
    args: &OutcomesArgs,
    format: OutputFormat,
) -> Result<(), AppError> {
    let outcomes: Vec<RecordOutcome> = client
        .get(&format!(
            "/jobs/{}/outcomes?errors_only={}",
            args.id, args.errors_only
        ))
        .await?;
    match format {
        OutputFormat::Json => output::print_json(&outcomes),
        OutputFormat::Table => {
            let rows: Vec<OutcomeRow> = outcomes.iter().map(OutcomeRow::from).collect();
            output::print_list(&rows, format);
        }
    }
    Ok(())
}
