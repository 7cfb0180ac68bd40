//! Follow a job's progress stream until it reaches a terminal state.

use std::pin::pin;

use futures::StreamExt;

use jobhub_api::dto::response::JobResponse;
use jobhub_core::error::AppError;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};
use crate::sse;

use super::job::{JobArg, print_job};

/// `watch`
pub async fn execute(client: &ApiClient, arg: &JobArg, format: OutputFormat) -> Result<(), AppError> {
    let response = client.open_stream(&format!("/jobs/{}/stream", arg.id)).await?;
    let mut updates = pin!(sse::progress_updates(response.bytes_stream()));
    let mut last: Option<JobResponse> = None;

    while let Some(job) = updates.next().await {
        let job = job?;
        match format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string(&job).unwrap_or_default()
            ),
            OutputFormat::Table => println!(
                "[{}] {:<9} {:>5.1}%  {}/{}  ok={} err={}",
                job.updated_at.format("%H:%M:%S"),
                job.status,
                job.progress_percent,
                job.processed,
                job.total,
                job.succeeded,
                job.failed,
            ),
        }
        last = Some(job);
    }

    match last {
        Some(job) if format == OutputFormat::Table => {
            println!();
            print_job(&job, format);
        }
        Some(_) => {}
        None => output::print_error("Stream closed before any progress was received"),
    }
    Ok(())
}
