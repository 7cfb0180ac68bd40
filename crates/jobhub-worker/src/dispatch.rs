//! Dispatch bookkeeping for the jobs this engine currently owns.
//!
//! The table tracks, per admitted job, which records are still waiting to
//! be handed to the pool and which are in flight. It holds no job metadata;
//! status and counters live only in the store.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use jobhub_core::types::JobId;
use jobhub_entity::job::{Job, JobPriority};
use jobhub_entity::record::{Record, RecordId};

use crate::queue::WorkItem;

/// Per-job dispatch state.
#[derive(Debug)]
struct JobRuntime {
    generation: u32,
    priority: JobPriority,
    created_at: DateTime<Utc>,
    pending: VecDeque<Record>,
    in_flight: HashSet<(RecordId, u32)>,
    halted: bool,
    dispatched: u64,
}

impl JobRuntime {
    fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}

/// A job whose runtime has nothing pending and nothing in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainedJob {
    /// The job
    pub job_id: JobId,
    /// Generation the runtime was installed for
    pub generation: u32,
    /// Whether dispatch had been stopped
    pub halted: bool,
}

/// Dispatch state for every job owned by this engine.
#[derive(Debug, Default)]
pub struct DispatchTable {
    jobs: Mutex<HashMap<JobId, JobRuntime>>,
}

impl DispatchTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an admitted job with the given pending records.
    ///
    /// An existing runtime for the job is reused: records of the same
    /// generation that are still in flight are not queued a second time.
    pub async fn install(&self, job: &Job, pending: Vec<Record>) {
        let mut jobs = self.jobs.lock().await;
        let runtime = jobs.entry(job.id).or_insert_with(|| JobRuntime {
            generation: job.generation,
            priority: job.effective_priority,
            created_at: job.created_at,
            pending: VecDeque::new(),
            in_flight: HashSet::new(),
            halted: false,
            dispatched: 0,
        });

        runtime.generation = job.generation;
        runtime.priority = job.effective_priority;
        runtime.halted = false;
        runtime.pending = pending
            .into_iter()
            .filter(|r| !runtime.in_flight.contains(&(r.id.clone(), job.generation)))
            .collect();
    }

    /// Stop dispatching a job. In-flight records are left to finish.
    pub async fn halt(&self, job_id: JobId) -> bool {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&job_id) {
            Some(rt) if !rt.halted => {
                rt.halted = true;
                rt.pending.clear();
                true
            }
            _ => false,
        }
    }

    /// Whether records of `generation` may still be processed for the job.
    pub async fn is_dispatchable(&self, job_id: JobId, generation: u32) -> bool {
        let jobs = self.jobs.lock().await;
        jobs.get(&job_id)
            .is_some_and(|rt| !rt.halted && rt.generation == generation)
    }

    /// Whether the job has a runtime that is not halted.
    pub async fn is_active(&self, job_id: JobId) -> bool {
        let jobs = self.jobs.lock().await;
        jobs.get(&job_id).is_some_and(|rt| !rt.halted)
    }

    /// Keep a record in flight for a retry if the job is still
    /// dispatchable, otherwise release it. Returns whether it was kept.
    pub async fn keep_for_retry(&self, job_id: JobId, record_id: &RecordId, generation: u32) -> bool {
        let mut jobs = self.jobs.lock().await;
        let Some(rt) = jobs.get_mut(&job_id) else {
            return false;
        };
        if !rt.halted && rt.generation == generation {
            return true;
        }
        rt.in_flight.remove(&(record_id.clone(), generation));
        false
    }

    /// Mark a record as no longer in flight.
    pub async fn complete(&self, job_id: JobId, record_id: &RecordId, generation: u32) {
        let mut jobs = self.jobs.lock().await;
        if let Some(rt) = jobs.get_mut(&job_id) {
            rt.in_flight.remove(&(record_id.clone(), generation));
        }
    }

    /// Take up to `budget` records across jobs, highest priority first, so
    /// that no job has more than `per_job_cap` records in flight.
    pub async fn next_batch(&self, per_job_cap: usize, mut budget: usize) -> Vec<WorkItem> {
        let mut jobs = self.jobs.lock().await;
        let mut order: Vec<(JobId, JobPriority, DateTime<Utc>)> = jobs
            .iter()
            .filter(|(_, rt)| !rt.halted && !rt.pending.is_empty())
            .map(|(id, rt)| (*id, rt.priority, rt.created_at))
            .collect();
        order.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        let mut batch = Vec::new();
        for (job_id, _, _) in order {
            if budget == 0 {
                break;
            }
            let Some(rt) = jobs.get_mut(&job_id) else {
                continue;
            };
            while budget > 0 && rt.in_flight.len() < per_job_cap {
                let Some(record) = rt.pending.pop_front() else {
                    break;
                };
                rt.in_flight.insert((record.id.clone(), rt.generation));
                rt.dispatched += 1;
                budget -= 1;
                batch.push(WorkItem {
                    job_id,
                    generation: rt.generation,
                    record,
                    attempt: 1,
                });
            }
        }
        batch
    }

    /// Runtimes with nothing left to do.
    pub async fn drained(&self) -> Vec<DrainedJob> {
        let jobs = self.jobs.lock().await;
        jobs.iter()
            .filter(|(_, rt)| rt.is_drained())
            .map(|(id, rt)| DrainedJob {
                job_id: *id,
                generation: rt.generation,
                halted: rt.halted,
            })
            .collect()
    }

    /// Drop a runtime if it is still drained.
    pub async fn remove_if_drained(&self, job_id: JobId) -> bool {
        let mut jobs = self.jobs.lock().await;
        if jobs.get(&job_id).is_some_and(JobRuntime::is_drained) {
            jobs.remove(&job_id);
            return true;
        }
        false
    }

    /// Jobs being actively dispatched, with their generation.
    pub async fn active(&self) -> Vec<(JobId, u32)> {
        let jobs = self.jobs.lock().await;
        jobs.iter()
            .filter(|(_, rt)| !rt.halted)
            .map(|(id, rt)| (*id, rt.generation))
            .collect()
    }

    /// Number of jobs being actively dispatched.
    pub async fn running_count(&self) -> usize {
        let jobs = self.jobs.lock().await;
        jobs.values().filter(|rt| !rt.halted).count()
    }

    /// Records in flight across all jobs.
    pub async fn in_flight_total(&self) -> usize {
        let jobs = self.jobs.lock().await;
        jobs.values().map(|rt| rt.in_flight.len()).sum()
    }

    /// Records in flight for one job.
    pub async fn in_flight(&self, job_id: JobId) -> usize {
        let jobs = self.jobs.lock().await;
        jobs.get(&job_id).map_or(0, |rt| rt.in_flight.len())
    }

    /// Whether this engine holds a runtime for the job, halted or not.
    pub async fn contains(&self, job_id: JobId) -> bool {
        self.jobs.lock().await.contains_key(&job_id)
    }

    /// Records handed to the pool for the job since it was first installed.
    pub async fn dispatched(&self, job_id: JobId) -> u64 {
        let jobs = self.jobs.lock().await;
        jobs.get(&job_id).map_or(0, |rt| rt.dispatched)
    }
}
