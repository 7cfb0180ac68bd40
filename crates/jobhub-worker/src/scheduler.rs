//! Job scheduler: admission, dispatch, completion, starvation promotion,
//! and orphan reconciliation.
//!
//! The scheduler is the only component that moves jobs between `Queued`,
//! `Running` and `Completed`. It wakes on demand (submissions, control
//! calls, settled records) and on a fixed housekeeping tick.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Notify, watch};
use tokio::time;
use tracing;

use jobhub_core::config::EngineConfig;
use jobhub_core::error::AppError;
use jobhub_core::types::JobId;
use jobhub_entity::job::{Job, JobPriority, JobStatus};
use jobhub_entity::record::{OutcomeStatus, Record, RecordId, RecordOutcome};
use jobhub_store::{JobStore, update_job};

use crate::dispatch::DispatchTable;
use crate::queue::WorkQueue;

/// Failure reason recorded when too many records failed.
pub const THRESHOLD_FAILURE_REASON: &str = "failure threshold exceeded";

/// Admits queued jobs and feeds their records to the worker pool
#[derive(Debug)]
pub struct JobScheduler {
    /// Job state store
    store: Arc<dyn JobStore>,
    /// Records handed to the pool
    queue: Arc<WorkQueue>,
    /// Dispatch bookkeeping shared with the pool
    dispatch: Arc<DispatchTable>,
    /// Wake-up signal
    wake: Arc<Notify>,
    /// Engine configuration
    config: EngineConfig,
}

impl JobScheduler {
    /// Create a new scheduler
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<WorkQueue>,
        dispatch: Arc<DispatchTable>,
        wake: Arc<Notify>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            queue,
            dispatch,
            wake,
            config,
        }
    }

    /// Request a scheduling pass
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Stop dispatching a job and request a pass
    pub async fn halt(&self, job_id: JobId) {
        if self.dispatch.halt(job_id).await {
            tracing::debug!("Halted dispatch for job {}", job_id);
        }
        self.wake();
    }

    /// Whether this engine is currently dispatching the job
    pub async fn is_dispatching(&self, job_id: JobId) -> bool {
        self.dispatch.is_active(job_id).await
    }

    /// Records handed to the pool for a job so far
    pub async fn dispatched(&self, job_id: JobId) -> u64 {
        self.dispatch.dispatched(job_id).await
    }

    /// Start the scheduler loop. Runs until the shutdown signal is received
    pub fn start(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(
                "Job scheduler started with max_running_jobs={}, per_job_cap={}, tick={}ms",
                scheduler.config.resolved_max_running_jobs(),
                scheduler.config.per_job_cap(),
                scheduler.config.tick_interval_ms
            );

            match scheduler.reconcile_orphans().await {
                Ok(0) => {}
                Ok(n) => tracing::warn!("Requeued {} orphaned job(s) at startup", n),
                Err(e) => tracing::error!("Startup reconciliation failed: {}", e),
            }

            let mut tick = time::interval(scheduler.config.tick_interval());
            tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            let reconcile_every = scheduler.config.reconcile_interval_seconds;
            let mut last_reconcile = time::Instant::now();

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Job scheduler received shutdown signal");
                            break;
                        }
                    }
                    _ = scheduler.wake.notified() => {}
                    _ = tick.tick() => {
                        if let Err(e) = scheduler.promote_starving().await {
                            tracing::error!("Starvation check failed: {}", e);
                        }
                        if reconcile_every > 0
                            && last_reconcile.elapsed().as_secs() >= reconcile_every
                        {
                            last_reconcile = time::Instant::now();
                            if let Err(e) = scheduler.reconcile_orphans().await {
                                tracing::error!("Orphan reconciliation failed: {}", e);
                            }
                        }
                    }
                }

                if let Err(e) = scheduler.pass().await {
                    tracing::error!("Scheduling pass failed: {}", e);
                }
            }

            match scheduler.requeue_owned().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Requeued {} running job(s) for the next start", n),
                Err(e) => tracing::error!("Failed to requeue running jobs: {}", e),
            }
            tracing::info!("Job scheduler stopped");
        })
    }

    /// One scheduling pass: stop jobs that left `Running`, finish drained
    /// jobs, admit queued jobs, then dispatch records.
    pub async fn pass(&self) -> Result<(), AppError> {
        self.check_running().await?;
        self.finish_drained().await?;
        self.admit().await?;
        self.dispatch_records().await;
        Ok(())
    }

    /// Halt runtimes whose job was paused, cancelled or failed elsewhere,
    /// and fail jobs past the failure threshold.
    async fn check_running(&self) -> Result<(), AppError> {
        for (job_id, generation) in self.dispatch.active().await {
            let job = match self.store.get(job_id).await {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!("Dropping dispatch for unreadable job {}: {}", job_id, e);
                    self.dispatch.halt(job_id).await;
                    continue;
                }
            };

            if job.status != JobStatus::Running || job.generation != generation {
                self.dispatch.halt(job_id).await;
                tracing::debug!("Job {} is {}, dispatch stopped", job_id, job.status);
                continue;
            }

            if self.threshold_exceeded(&job).await? {
                self.dispatch.halt(job_id).await;
                self.fail(job_id, generation, THRESHOLD_FAILURE_REASON).await?;
            }
        }
        Ok(())
    }

    /// Complete drained jobs and drop drained halted runtimes.
    async fn finish_drained(&self) -> Result<(), AppError> {
        for drained in self.dispatch.drained().await {
            if drained.halted {
                self.dispatch.remove_if_drained(drained.job_id).await;
                continue;
            }

            let job = self.store.get(drained.job_id).await?;
            if job.status != JobStatus::Running || job.generation != drained.generation {
                self.dispatch.halt(drained.job_id).await;
                continue;
            }

            let latest = self.store.latest_outcomes(drained.job_id).await?;
            let records = self.store.records(drained.job_id).await?;
            let pending = pending_records(records, &latest, job.generation);
            if !pending.is_empty() {
                tracing::debug!(
                    "Job {} drained with {} record(s) unsettled, requeueing them",
                    drained.job_id,
                    pending.len()
                );
                self.dispatch.install(&job, pending).await;
                continue;
            }

            let (succeeded, failed) = tally(&latest);
            let threshold = self.config.failure_threshold;
            let (job, changed) = update_job(self.store.as_ref(), drained.job_id, |job| {
                if job.status != JobStatus::Running || job.generation != drained.generation {
                    return Ok(false);
                }
                if job.processed != job.total {
                    job.succeeded = succeeded;
                    job.failed = failed;
                    job.processed = succeeded + failed;
                }
                let over = threshold.is_some_and(|t| job.failure_ratio() > t);
                if over {
                    job.transition(JobStatus::Failed, Utc::now())?;
                    job.failure_reason = Some(THRESHOLD_FAILURE_REASON.to_string());
                } else {
                    job.transition(JobStatus::Completed, Utc::now())?;
                }
                Ok(true)
            })
            .await?;

            self.dispatch.remove_if_drained(drained.job_id).await;

            if changed {
                tracing::info!(
                    "Job {} {}: processed={}, succeeded={}, failed={}",
                    job.id,
                    job.status,
                    job.processed,
                    job.succeeded,
                    job.failed
                );
            }
        }
        Ok(())
    }

    /// Admit queued jobs while running capacity remains.
    async fn admit(&self) -> Result<(), AppError> {
        let max_running = self.config.resolved_max_running_jobs();
        let mut running = self.dispatch.running_count().await;
        if running >= max_running {
            return Ok(());
        }

        let mut queued: Vec<Job> = self
            .store
            .list_by_status(JobStatus::Queued)
            .await?
            .into_iter()
            .filter(|job| job.total_known)
            .collect();
        queued.sort_by(|a, b| {
            b.effective_priority
                .cmp(&a.effective_priority)
                .then(a.created_at.cmp(&b.created_at))
        });

        for candidate in queued {
            if running >= max_running {
                break;
            }

            let (job, admitted) = update_job(self.store.as_ref(), candidate.id, |job| {
                if job.status != JobStatus::Queued || !job.total_known {
                    return Ok(false);
                }
                job.transition(JobStatus::Running, Utc::now())?;
                Ok(true)
            })
            .await?;
            if !admitted {
                continue;
            }

            let latest = self.store.latest_outcomes(job.id).await?;
            let records = self.store.records(job.id).await?;
            let pending = pending_records(records, &latest, job.generation);
            tracing::info!(
                "Admitted job {} ('{}', {}, priority={}): {} of {} record(s) pending, generation {}",
                job.id,
                job.name,
                job.job_type,
                job.effective_priority,
                pending.len(),
                job.total,
                job.generation
            );
            self.dispatch.install(&job, pending).await;
            running += 1;
        }
        Ok(())
    }

    /// Move pending records onto the work queue within the pool budget.
    async fn dispatch_records(&self) {
        let pool = self.config.resolved_pool_size();
        let budget = pool.saturating_sub(self.dispatch.in_flight_total().await);
        if budget == 0 {
            return;
        }
        for item in self
            .dispatch
            .next_batch(self.config.per_job_cap(), budget)
            .await
        {
            self.queue.push(item).await;
        }
    }

    /// Promote queued jobs that waited longer than the starvation threshold.
    pub async fn promote_starving(&self) -> Result<usize, AppError> {
        if self.config.starvation_threshold_seconds == 0 {
            return Ok(0);
        }
        let threshold = chrono::Duration::seconds(self.config.starvation_threshold_seconds as i64);
        let now = Utc::now();
        let mut promoted = 0;

        for job in self.store.list_by_status(JobStatus::Queued).await? {
            if job.effective_priority == JobPriority::Critical || now - job.queued_at < threshold {
                continue;
            }
            let (job, changed) = update_job(self.store.as_ref(), job.id, |job| {
                if job.status != JobStatus::Queued
                    || job.effective_priority == JobPriority::Critical
                    || Utc::now() - job.queued_at < threshold
                {
                    return Ok(false);
                }
                job.effective_priority = job.effective_priority.promoted();
                job.queued_at = Utc::now();
                Ok(true)
            })
            .await?;
            if changed {
                promoted += 1;
                tracing::info!(
                    "Promoted starving job {} to priority {}",
                    job.id,
                    job.effective_priority
                );
            }
        }

        if promoted > 0 {
            self.wake();
        }
        Ok(promoted)
    }

    /// Requeue `Running` jobs that no engine is dispatching and that have
    /// not been updated within the liveness timeout. Counters are rebuilt
    /// from the recorded outcomes.
    pub async fn reconcile_orphans(&self) -> Result<usize, AppError> {
        let liveness = chrono::Duration::seconds(self.config.liveness_timeout_seconds as i64);
        let mut requeued = 0;

        for job in self.store.list_by_status(JobStatus::Running).await? {
            if self.dispatch.contains(job.id).await || Utc::now() - job.updated_at < liveness {
                continue;
            }
            let stale = |job: &Job| Utc::now() - job.updated_at >= liveness;
            if self.requeue(job.id, true, stale).await? {
                requeued += 1;
                tracing::warn!(
                    "Job {} was orphaned (last update {}), requeued",
                    job.id,
                    job.updated_at
                );
            }
        }

        if requeued > 0 {
            self.wake();
        }
        Ok(requeued)
    }

    /// Hand every job this engine is running back to `Queued`.
    pub async fn requeue_owned(&self) -> Result<usize, AppError> {
        let mut requeued = 0;
        for (job_id, _) in self.dispatch.active().await {
            self.dispatch.halt(job_id).await;
            if self.requeue(job_id, false, |_| true).await? {
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    /// Move a running job back to `Queued`. Counters are rebuilt from the
    /// outcome log only when no worker of this engine can still commit to it.
    async fn requeue<P>(
        &self,
        job_id: JobId,
        rebuild_counters: bool,
        still_eligible: P,
    ) -> Result<bool, AppError>
    where
        P: Fn(&Job) -> bool + Send + Sync,
    {
        let counts = if rebuild_counters {
            Some(tally(&self.store.latest_outcomes(job_id).await?))
        } else {
            None
        };
        let (_, changed) = update_job(self.store.as_ref(), job_id, |job| {
            if job.status != JobStatus::Running || !still_eligible(job) {
                return Ok(false);
            }
            if let Some((succeeded, failed)) = counts {
                job.succeeded = succeeded;
                job.failed = failed;
                job.processed = succeeded + failed;
            }
            job.transition(JobStatus::Queued, Utc::now())?;
            Ok(true)
        })
        .await?;
        Ok(changed)
    }

    async fn fail(&self, job_id: JobId, generation: u32, reason: &str) -> Result<(), AppError> {
        let (job, changed) = update_job(self.store.as_ref(), job_id, |job| {
            if job.status != JobStatus::Running || job.generation != generation {
                return Ok(false);
            }
            job.transition(JobStatus::Failed, Utc::now())?;
            job.failure_reason = Some(reason.to_string());
            Ok(true)
        })
        .await?;
        if changed {
            tracing::warn!(
                "Job {} failed: {} (failed {}/{})",
                job_id,
                reason,
                job.failed,
                job.total
            );
        }
        Ok(())
    }

    /// Mid-run threshold check. Errors left over from an earlier generation
    /// are still pending and do not count against the current run.
    async fn threshold_exceeded(&self, job: &Job) -> Result<bool, AppError> {
        let Some(threshold) = self.config.failure_threshold else {
            return Ok(false);
        };
        // `failed` bounds the current generation's errors from above.
        if job.total == 0 || job.failure_ratio() <= threshold {
            return Ok(false);
        }

        let latest = self.store.latest_outcomes(job.id).await?;
        let failed = current_failures(&latest, job.generation);
        Ok(failed as f64 / job.total as f64 > threshold)
    }
}

/// Records that still need an outcome in `generation`: no outcome yet, or
/// an error from an earlier generation. Successes are never pending.
pub fn pending_records(
    records: Vec<Record>,
    latest: &HashMap<RecordId, RecordOutcome>,
    generation: u32,
) -> Vec<Record> {
    records
        .into_iter()
        .filter(|record| match latest.get(&record.id) {
            None => true,
            Some(outcome) => {
                outcome.status == OutcomeStatus::Error && outcome.generation < generation
            }
        })
        .collect()
}

/// Count successes and errors among the latest outcomes.
fn tally(latest: &HashMap<RecordId, RecordOutcome>) -> (u64, u64) {
    latest.values().fold((0, 0), |(ok, err), outcome| match outcome.status {
        OutcomeStatus::Success => (ok + 1, err),
        OutcomeStatus::Error => (ok, err + 1),
    })
}

/// Errors recorded in `generation` among the latest outcomes.
fn current_failures(latest: &HashMap<RecordId, RecordOutcome>, generation: u32) -> u64 {
    latest
        .values()
        .filter(|o| o.status == OutcomeStatus::Error && o.generation == generation)
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobhub_entity::job::{CreateJob, JobType};
    use jobhub_entity::record::ErrorClass;
    use jobhub_store::MemoryJobStore;

    fn scheduler(config: EngineConfig) -> (JobScheduler, Arc<MemoryJobStore>, Arc<WorkQueue>) {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(WorkQueue::new());
        let scheduler = JobScheduler::new(
            store.clone(),
            Arc::clone(&queue),
            Arc::new(DispatchTable::new()),
            Arc::new(Notify::new()),
            config,
        );
        (scheduler, store, queue)
    }

    fn queued_job(priority: JobPriority, total: u64) -> Job {
        Job::new(
            CreateJob {
                job_type: JobType::GenerateForm,
                name: "Form Generation".to_string(),
                priority,
                created_by: "System Admin".to_string(),
                total,
                total_known: true,
            },
            Utc::now(),
        )
    }

    fn records(ids: &[&str]) -> Vec<Record> {
        ids.iter()
            .map(|id| Record::new(*id, serde_json::Value::Null))
            .collect()
    }

    #[test]
    fn test_pending_records_skip_successes_and_current_errors() {
        let mut latest = HashMap::new();
        latest.insert(
            RecordId::from("a"),
            RecordOutcome::success("a".into(), 1, 1, None),
        );
        latest.insert(
            RecordId::from("b"),
            RecordOutcome::error("b".into(), 1, 3, ErrorClass::TransientExhausted, "timeout"),
        );
        latest.insert(
            RecordId::from("c"),
            RecordOutcome::error("c".into(), 2, 1, ErrorClass::Permanent, "bad input"),
        );

        let pending = pending_records(records(&["a", "b", "c", "d"]), &latest, 2);
        let ids: Vec<&str> = pending.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);

        let pending = pending_records(records(&["a", "b", "c", "d"]), &latest, 1);
        let ids: Vec<&str> = pending.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["d"]);
    }

    #[test]
    fn test_tally_counts_latest_outcomes() {
        let mut latest = HashMap::new();
        latest.insert(RecordId::from("a"), RecordOutcome::success("a".into(), 1, 1, None));
        latest.insert(
            RecordId::from("b"),
            RecordOutcome::error("b".into(), 1, 1, ErrorClass::Permanent, "bad"),
        );
        assert_eq!(tally(&latest), (1, 1));
    }

    #[tokio::test]
    async fn test_pass_admits_and_dispatches_within_cap() {
        let config = EngineConfig {
            pool_size: 4,
            ..EngineConfig::default()
        };
        let (scheduler, store, queue) = scheduler(config);
        let job = queued_job(JobPriority::Normal, 10);
        let id = store
            .create_with_records(job, records(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]))
            .await
            .unwrap();

        scheduler.pass().await.unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert_eq!(queue.len().await, 2);
        assert!(scheduler.is_dispatching(id).await);
    }

    #[tokio::test]
    async fn test_streaming_job_waits_for_total() {
        let (scheduler, store, queue) = scheduler(EngineConfig::default());
        let mut job = queued_job(JobPriority::Critical, 0);
        job.total_known = false;
        let id = store.create(job).await.unwrap();

        scheduler.pass().await.unwrap();

        assert_eq!(store.get(id).await.unwrap().status, JobStatus::Queued);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_drained_job_completes() {
        let (scheduler, store, _queue) = scheduler(EngineConfig::default());
        let id = store.create(queued_job(JobPriority::Low, 0)).await.unwrap();

        scheduler.pass().await.unwrap();
        scheduler.pass().await.unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percent(), 100.0);
    }

    #[tokio::test]
    async fn test_starving_job_is_promoted() {
        let config = EngineConfig {
            starvation_threshold_seconds: 60,
            ..EngineConfig::default()
        };
        let (scheduler, store, _queue) = scheduler(config);
        let mut stale = queued_job(JobPriority::Low, 1);
        stale.queued_at = Utc::now() - chrono::Duration::minutes(5);
        let stale_id = store.create(stale).await.unwrap();
        let fresh_id = store.create(queued_job(JobPriority::Low, 1)).await.unwrap();

        assert_eq!(scheduler.promote_starving().await.unwrap(), 1);

        let stale = store.get(stale_id).await.unwrap();
        assert_eq!(stale.effective_priority, JobPriority::Normal);
        assert_eq!(stale.priority, JobPriority::Low);
        assert!(Utc::now() - stale.queued_at < chrono::Duration::seconds(5));
        let fresh = store.get(fresh_id).await.unwrap();
        assert_eq!(fresh.effective_priority, JobPriority::Low);

        assert_eq!(scheduler.promote_starving().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_requeues_stale_running_job() {
        let (scheduler, store, _queue) = scheduler(EngineConfig::default());
        let mut job = queued_job(JobPriority::Normal, 3);
        job.transition(JobStatus::Running, Utc::now()).unwrap();
        job.processed = 3;
        job.succeeded = 3;
        job.updated_at = Utc::now() - chrono::Duration::hours(1);
        let id = store
            .create_with_records(job, records(&["a", "b", "c"]))
            .await
            .unwrap();
        store
            .append_outcome(id, RecordOutcome::success("a".into(), 1, 1, None))
            .await
            .unwrap();

        assert_eq!(scheduler.reconcile_orphans().await.unwrap(), 1);

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!((job.processed, job.succeeded, job.failed), (1, 1, 0));
    }

    async fn requeued_job_with_errors(
        store: &MemoryJobStore,
        generation: u32,
        error_generation: u32,
    ) -> JobId {
        let mut job = queued_job(JobPriority::Normal, 4);
        job.generation = generation;
        job.processed = 3;
        job.failed = 3;
        let id = store
            .create_with_records(job, records(&["a", "b", "c", "d"]))
            .await
            .unwrap();
        for rid in ["a", "b", "c"] {
            store
                .append_outcome(
                    id,
                    RecordOutcome::error(rid.into(), error_generation, 1, ErrorClass::Permanent, "bad"),
                )
                .await
                .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn test_errors_from_earlier_generation_do_not_trip_threshold() {
        let (scheduler, store, queue) = scheduler(EngineConfig::default());
        let id = requeued_job_with_errors(&store, 2, 1).await;

        scheduler.pass().await.unwrap();
        scheduler.pass().await.unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.failure_reason.is_none());
        assert!(scheduler.is_dispatching(id).await);
        assert!(!queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_current_generation_errors_trip_threshold() {
        let (scheduler, store, _queue) = scheduler(EngineConfig::default());
        let id = requeued_job_with_errors(&store, 1, 1).await;

        scheduler.pass().await.unwrap();
        scheduler.pass().await.unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some(THRESHOLD_FAILURE_REASON));
    }
}
