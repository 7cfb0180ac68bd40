//! Job state store contract.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::watch;

use jobhub_core::result::AppResult;
use jobhub_core::types::JobId;
use jobhub_entity::job::{Job, JobStatus};
use jobhub_entity::record::{OutcomeStatus, Record, RecordId, RecordOutcome};

/// Result of appending a record outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeAppend {
    /// The record's latest outcome before this append.
    pub previous: Option<OutcomeStatus>,
    /// Whether the outcome was written to the log. A second success for a
    /// record is never written.
    pub appended: bool,
}

/// Durable record of jobs, their input records, and their outcomes.
///
/// Implementations own all locking internally and must be safe for
/// concurrent callers. No method blocks on anything but the store itself.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist a new job and return its identifier.
    async fn create(&self, job: Job) -> AppResult<JobId> {
        self.create_with_records(job, Vec::new()).await
    }

    /// Persist a new job together with its input records, atomically.
    /// Record ids must be unique.
    async fn create_with_records(&self, job: Job, records: Vec<Record>) -> AppResult<JobId>;

    /// Fetch a job snapshot. Unknown ids are `NotFound`.
    async fn get(&self, id: JobId) -> AppResult<Job>;

    /// Replace the job if its stored revision equals `expected_revision`.
    ///
    /// Returns the stored job and `true` on success (with `revision`
    /// incremented), or the current job and `false` on a revision mismatch.
    /// A mismatch is not an error.
    async fn compare_and_swap(
        &self,
        id: JobId,
        expected_revision: u64,
        job: Job,
    ) -> AppResult<(Job, bool)>;

    /// Append a record outcome to the job's audit log.
    async fn append_outcome(&self, id: JobId, outcome: RecordOutcome) -> AppResult<OutcomeAppend>;

    /// All jobs currently in `status`, oldest first.
    async fn list_by_status(&self, status: JobStatus) -> AppResult<Vec<Job>>;

    /// Every job, newest first.
    async fn list(&self) -> AppResult<Vec<Job>>;

    /// Append input records to a job. Record ids must be unique per job.
    async fn append_records(&self, id: JobId, records: Vec<Record>) -> AppResult<u64>;

    /// The job's input records in submission order.
    async fn records(&self, id: JobId) -> AppResult<Vec<Record>>;

    /// The latest outcome of every record that has one.
    async fn latest_outcomes(&self, id: JobId) -> AppResult<HashMap<RecordId, RecordOutcome>>;

    /// The latest outcome of one record, if it has any.
    async fn latest_outcome(
        &self,
        id: JobId,
        record_id: &RecordId,
    ) -> AppResult<Option<RecordOutcome>>;

    /// The full, append-only outcome log.
    async fn outcomes(&self, id: JobId) -> AppResult<Vec<RecordOutcome>>;

    /// Subscribe to snapshots of a job; the receiver sees every committed
    /// revision's latest value.
    fn subscribe(&self, id: JobId) -> AppResult<watch::Receiver<Job>>;
}
