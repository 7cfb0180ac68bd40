//! Record sources and background ingestion of streamed records.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{info, warn};

use jobhub_core::error::AppError;
use jobhub_core::types::JobId;
use jobhub_entity::job::JobStatus;
use jobhub_entity::record::Record;
use jobhub_store::{JobStore, update_job};
use jobhub_worker::JobScheduler;

use super::service::validate_records;

/// Records appended to the store per ingestion batch.
const INGEST_BATCH: usize = 256;

/// Asynchronous stream of records, for sources whose size is not known up
/// front.
pub type RecordStream = BoxStream<'static, Result<Record, AppError>>;

/// Where a job's records come from.
pub enum RecordSource {
    /// All records supplied with the submission.
    Inline(Vec<Record>),
    /// Records read from a stream after the job is queued.
    Stream(RecordStream),
}

impl fmt::Debug for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(records) => f.debug_tuple("Inline").field(&records.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Vec<Record>> for RecordSource {
    fn from(records: Vec<Record>) -> Self {
        Self::Inline(records)
    }
}

/// Drain `stream` into the store on a background task, then publish the
/// final total so the scheduler can admit the job.
pub(crate) fn spawn_ingestion(
    store: Arc<dyn JobStore>,
    scheduler: Arc<JobScheduler>,
    job_id: JobId,
    stream: RecordStream,
) {
    tokio::spawn(async move {
        match ingest(store.as_ref(), job_id, stream).await {
            Ok(Some(total)) => {
                info!(job_id = %job_id, total, "Record ingestion finished");
                scheduler.wake();
            }
            Ok(None) => {
                info!(job_id = %job_id, "Record ingestion stopped, job left the queue");
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Record ingestion failed");
                let reason = format!("record ingestion failed: {}", e.message);
                if let Err(e) = fail_queued(store.as_ref(), job_id, reason).await {
                    warn!(job_id = %job_id, error = %e, "Failed to mark job as failed");
                }
            }
        }
    });
}

/// Returns the final total, or `None` if the job stopped being `Queued`
/// while records were still arriving.
async fn ingest(
    store: &dyn JobStore,
    job_id: JobId,
    stream: RecordStream,
) -> Result<Option<u64>, AppError> {
    let mut chunks = stream.ready_chunks(INGEST_BATCH);
    let mut total = 0u64;

    while let Some(chunk) = chunks.next().await {
        let records = chunk.into_iter().collect::<Result<Vec<Record>, AppError>>()?;
        validate_records(&records)?;
        total = store.append_records(job_id, records).await?;

        if store.get(job_id).await?.status != JobStatus::Queued {
            return Ok(None);
        }
    }

    if total == 0 {
        return Err(AppError::validation("record stream was empty"));
    }

    let (_, published) = update_job(store, job_id, |job| {
        if job.status != JobStatus::Queued || job.total_known {
            return Ok(false);
        }
        job.total = total;
        job.total_known = true;
        Ok(true)
    })
    .await?;

    Ok(published.then_some(total))
}

async fn fail_queued(store: &dyn JobStore, job_id: JobId, reason: String) -> Result<(), AppError> {
    update_job(store, job_id, |job| {
        if job.status != JobStatus::Queued {
            return Ok(false);
        }
        job.transition(JobStatus::Failed, Utc::now())?;
        job.failure_reason = Some(reason.clone());
        Ok(true)
    })
    .await?;
    Ok(())
}
