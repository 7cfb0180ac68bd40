//! In-memory job store using the dashmap crate.
//!
//! Each job lives in its own map entry; the entry's shard lock is the
//! serialization point for that job's CAS and outcome appends.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tracing::debug;

use jobhub_core::error::AppError;
use jobhub_core::result::AppResult;
use jobhub_core::types::JobId;
use jobhub_entity::job::{Job, JobStatus};
use jobhub_entity::record::{OutcomeStatus, Record, RecordId, RecordOutcome};

use crate::snapshot::{StoreSnapshot, StoredJob};
use crate::store::{JobStore, OutcomeAppend};

/// Everything the store keeps for one job.
#[derive(Debug)]
struct JobEntry {
    job: Job,
    records: Vec<Record>,
    record_ids: HashSet<RecordId>,
    outcomes: Vec<RecordOutcome>,
    latest: HashMap<RecordId, RecordOutcome>,
    watcher: watch::Sender<Job>,
}

impl JobEntry {
    fn new(job: Job) -> Self {
        let (watcher, _) = watch::channel(job.clone());
        Self {
            job,
            records: Vec::new(),
            record_ids: HashSet::new(),
            outcomes: Vec::new(),
            latest: HashMap::new(),
            watcher,
        }
    }

    fn from_stored(stored: StoredJob) -> Self {
        let mut entry = Self::new(stored.job);
        entry.record_ids = stored.records.iter().map(|r| r.id.clone()).collect();
        entry.records = stored.records;
        for outcome in stored.outcomes {
            entry.track_latest(&outcome);
            entry.outcomes.push(outcome);
        }
        entry
    }

    /// Latest wins, except that a success is never replaced.
    fn track_latest(&mut self, outcome: &RecordOutcome) {
        let keep_existing = self
            .latest
            .get(&outcome.record_id)
            .is_some_and(RecordOutcome::is_success);
        if !keep_existing {
            self.latest
                .insert(outcome.record_id.clone(), outcome.clone());
        }
    }
}

/// In-memory [`JobStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    /// Job entries by id.
    jobs: Arc<DashMap<JobId, JobEntry>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        for stored in snapshot.jobs {
            store
                .jobs
                .insert(stored.job.id, JobEntry::from_stored(stored));
        }
        store
    }

    /// Capture every job, record, and outcome.
    pub fn snapshot(&self) -> StoreSnapshot {
        let jobs = self
            .jobs
            .iter()
            .map(|entry| StoredJob {
                job: entry.job.clone(),
                records: entry.records.clone(),
                outcomes: entry.outcomes.clone(),
            })
            .collect();
        StoreSnapshot { jobs }
    }

    /// Number of live progress subscriptions for a job.
    pub fn subscriber_count(&self, id: JobId) -> usize {
        self.jobs
            .get(&id)
            .map(|entry| entry.watcher.receiver_count())
            .unwrap_or(0)
    }

    fn not_found(id: JobId) -> AppError {
        AppError::not_found(format!("Job {id} not found"))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_with_records(&self, job: Job, records: Vec<Record>) -> AppResult<JobId> {
        let id = job.id;
        let mut record_ids = HashSet::with_capacity(records.len());
        for record in &records {
            if !record_ids.insert(record.id.clone()) {
                return Err(AppError::validation(format!(
                    "Duplicate record id '{}' in job {id}",
                    record.id
                )));
            }
        }

        match self.jobs.entry(id) {
            Entry::Occupied(_) => {
                Err(AppError::conflict(format!("Job {id} already exists")))
            }
            Entry::Vacant(slot) => {
                let mut entry = JobEntry::new(job);
                entry.record_ids = record_ids;
                entry.records = records;
                slot.insert(entry);
                debug!(job_id = %id, "Job created");
                Ok(id)
            }
        }
    }

    async fn get(&self, id: JobId) -> AppResult<Job> {
        self.jobs
            .get(&id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn compare_and_swap(
        &self,
        id: JobId,
        expected_revision: u64,
        mut job: Job,
    ) -> AppResult<(Job, bool)> {
        let mut entry = self.jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;

        if entry.job.revision != expected_revision {
            return Ok((entry.job.clone(), false));
        }
        if job.id != id {
            return Err(AppError::internal(format!(
                "CAS for job {id} carried job {}",
                job.id
            )));
        }

        job.revision = expected_revision + 1;
        entry.job = job.clone();
        entry.watcher.send_replace(job.clone());
        Ok((job, true))
    }

    async fn append_outcome(&self, id: JobId, outcome: RecordOutcome) -> AppResult<OutcomeAppend> {
        let mut entry = self.jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;

        let previous = entry.latest.get(&outcome.record_id).map(|o| o.status);
        if previous == Some(OutcomeStatus::Success) && outcome.is_success() {
            return Ok(OutcomeAppend {
                previous,
                appended: false,
            });
        }

        entry.track_latest(&outcome);
        entry.outcomes.push(outcome);
        Ok(OutcomeAppend {
            previous,
            appended: true,
        })
    }

    async fn list_by_status(&self, status: JobStatus) -> AppResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| entry.job.status == status)
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by_key(|job| (job.created_at, job.id));
        Ok(jobs)
    }

    async fn list(&self) -> AppResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|entry| entry.job.clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn append_records(&self, id: JobId, records: Vec<Record>) -> AppResult<u64> {
        let mut entry = self.jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;

        let mut batch = HashSet::with_capacity(records.len());
        for record in &records {
            if entry.record_ids.contains(&record.id) || !batch.insert(record.id.clone()) {
                return Err(AppError::validation(format!(
                    "Duplicate record id '{}' in job {id}",
                    record.id
                )));
            }
        }

        entry.record_ids.extend(batch);
        entry.records.extend(records);
        Ok(entry.records.len() as u64)
    }

    async fn records(&self, id: JobId) -> AppResult<Vec<Record>> {
        self.jobs
            .get(&id)
            .map(|entry| entry.records.clone())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn latest_outcomes(&self, id: JobId) -> AppResult<HashMap<RecordId, RecordOutcome>> {
        self.jobs
            .get(&id)
            .map(|entry| entry.latest.clone())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn latest_outcome(
        &self,
        id: JobId,
        record_id: &RecordId,
    ) -> AppResult<Option<RecordOutcome>> {
        self.jobs
            .get(&id)
            .map(|entry| entry.latest.get(record_id).cloned())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn outcomes(&self, id: JobId) -> AppResult<Vec<RecordOutcome>> {
        self.jobs
            .get(&id)
            .map(|entry| entry.outcomes.clone())
            .ok_or_else(|| Self::not_found(id))
    }

    fn subscribe(&self, id: JobId) -> AppResult<watch::Receiver<Job>> {
        self.jobs
            .get(&id)
            .map(|entry| entry.watcher.subscribe())
            .ok_or_else(|| Self::not_found(id))
    }
}
