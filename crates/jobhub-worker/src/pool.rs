//! Worker pool: a fixed set of workers that pull records from the work
//! queue, run the job type's processor, and commit outcomes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing;

use jobhub_core::config::EngineConfig;
use jobhub_core::error::AppError;
use jobhub_core::types::JobId;
use jobhub_entity::job::JobStatus;
use jobhub_entity::record::{ErrorClass, RecordOutcome};
use jobhub_store::{JobStore, update_job};

use crate::dispatch::DispatchTable;
use crate::processor::{ProcessContext, ProcessError, ProcessorRegistry};
use crate::queue::{WorkItem, WorkQueue};

/// Fixed-size pool of record workers
#[derive(Debug)]
pub struct WorkerPool {
    /// Job state store
    store: Arc<dyn JobStore>,
    /// Processors by job type
    registry: Arc<ProcessorRegistry>,
    /// Records dispatched by the scheduler
    queue: Arc<WorkQueue>,
    /// Dispatch bookkeeping shared with the scheduler
    dispatch: Arc<DispatchTable>,
    /// Wakes the scheduler after a record settles
    scheduler_wake: Arc<Notify>,
    /// Engine configuration
    config: EngineConfig,
    /// Cancelled when the pool shuts down
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ProcessorRegistry>,
        queue: Arc<WorkQueue>,
        dispatch: Arc<DispatchTable>,
        scheduler_wake: Arc<Notify>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            queue,
            dispatch,
            scheduler_wake,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.config.resolved_pool_size()
    }

    /// Start every worker. The returned task finishes once all workers have
    /// stopped after the shutdown signal; records already being processed
    /// run to completion first.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let size = pool.size();
            tracing::info!(
                "Worker pool started with size={}, per_job_cap={}, max_attempts={}, record_timeout={}ms",
                size,
                pool.config.per_job_cap(),
                pool.config.max_attempts,
                pool.config.record_timeout_ms
            );

            let mut workers = JoinSet::new();
            for worker_id in 0..size {
                let pool = Arc::clone(&pool);
                let shutdown = shutdown.clone();
                workers.spawn(async move { pool.run_worker(worker_id, shutdown).await });
            }

            while let Some(result) = workers.join_next().await {
                if let Err(e) = result {
                    tracing::error!("Worker task panicked: {}", e);
                }
            }

            tracing::info!("Worker pool shut down complete");
        })
    }

    /// Single worker loop. Runs until the shutdown signal is received
    async fn run_worker(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Worker {} started", worker_id);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                item = self.queue.pop() => {
                    self.handle(item).await;
                }
            }
        }

        self.shutdown.cancel();
        tracing::debug!("Worker {} stopped", worker_id);
    }

    /// Run one dispatched record to a settled state.
    async fn handle(&self, item: WorkItem) {
        let job_id = item.job_id;
        let generation = item.generation;
        let record_id = item.record.id.clone();

        match self.process_item(item).await {
            Ok(Settled::Done) => {
                self.dispatch.complete(job_id, &record_id, generation).await;
            }
            Ok(Settled::RetryScheduled) => {}
            Err(e) => {
                tracing::error!(
                    "Failed to settle record '{}' of job {}: {}",
                    record_id,
                    job_id,
                    e
                );
                self.dispatch.complete(job_id, &record_id, generation).await;
            }
        }

        self.scheduler_wake.notify_one();
    }

    async fn process_item(&self, item: WorkItem) -> Result<Settled, AppError> {
        let WorkItem {
            job_id,
            generation,
            record,
            attempt,
        } = item;

        if !self.dispatch.is_dispatchable(job_id, generation).await {
            return Ok(Settled::Done);
        }

        let job = self.store.get(job_id).await?;
        if job.status != JobStatus::Running || job.generation != generation {
            tracing::debug!(
                "Skipping record '{}': job {} is {} (generation {})",
                record.id,
                job_id,
                job.status,
                job.generation
            );
            return Ok(Settled::Done);
        }

        if let Some(existing) = self.store.latest_outcome(job_id, &record.id).await? {
            if existing.is_success() || existing.generation >= generation {
                tracing::debug!(
                    "Skipping record '{}' of job {}: outcome already recorded",
                    record.id,
                    job_id
                );
                return Ok(Settled::Done);
            }
        }

        let Some(processor) = self.registry.get(job.job_type) else {
            let reason = format!("No processor registered for job type '{}'", job.job_type);
            self.record_outcome(
                job_id,
                RecordOutcome::error(record.id.clone(), generation, attempt, ErrorClass::Fatal, &reason),
            )
            .await?;
            self.fail_job(job_id, generation, reason).await?;
            return Ok(Settled::Done);
        };

        let ctx = ProcessContext {
            job_id,
            generation,
            attempt,
            shutdown: self.shutdown.clone(),
        };

        let timeout = self.config.record_timeout();
        let result = match tokio::time::timeout(timeout, processor.process(&ctx, &job, &record)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProcessError::Transient(format!(
                "processor timed out after {}ms",
                timeout.as_millis()
            ))),
        };

        let outcome = match result {
            Ok(output) => RecordOutcome::success(record.id.clone(), generation, attempt, output),
            Err(ProcessError::Transient(msg)) if attempt < self.config.max_attempts => {
                let delay = self.config.backoff_delay(attempt);
                tracing::warn!(
                    "Record '{}' of job {} failed (transient, attempt {}/{}), retrying in {}ms: {}",
                    record.id,
                    job_id,
                    attempt,
                    self.config.max_attempts,
                    delay.as_millis(),
                    msg
                );
                self.schedule_retry(
                    WorkItem {
                        job_id,
                        generation,
                        record,
                        attempt: attempt + 1,
                    },
                    delay,
                );
                return Ok(Settled::RetryScheduled);
            }
            Err(ProcessError::Transient(msg)) => {
                tracing::warn!(
                    "Record '{}' of job {} exhausted {} attempts: {}",
                    record.id,
                    job_id,
                    attempt,
                    msg
                );
                RecordOutcome::error(
                    record.id.clone(),
                    generation,
                    attempt,
                    ErrorClass::TransientExhausted,
                    msg,
                )
            }
            Err(ProcessError::Permanent(msg)) => {
                tracing::info!(
                    "Record '{}' of job {} failed permanently: {}",
                    record.id,
                    job_id,
                    msg
                );
                RecordOutcome::error(record.id.clone(), generation, attempt, ErrorClass::Permanent, msg)
            }
            Err(ProcessError::Fatal(msg)) => {
                tracing::error!(
                    "Record '{}' of job {} reported a fatal error: {}",
                    record.id,
                    job_id,
                    msg
                );
                self.record_outcome(
                    job_id,
                    RecordOutcome::error(record.id.clone(), generation, attempt, ErrorClass::Fatal, &msg),
                )
                .await?;
                self.fail_job(job_id, generation, msg).await?;
                return Ok(Settled::Done);
            }
        };

        self.record_outcome(job_id, outcome).await?;
        Ok(Settled::Done)
    }

    /// Append the outcome and fold it into the job's counters.
    async fn record_outcome(&self, job_id: JobId, outcome: RecordOutcome) -> Result<(), AppError> {
        let status = outcome.status;
        let appended = self.store.append_outcome(job_id, outcome).await?;
        if !appended.appended {
            return Ok(());
        }

        update_job(self.store.as_ref(), job_id, |job| {
            Ok(job.apply_outcome(appended.previous, status))
        })
        .await?;
        Ok(())
    }

    /// Move a running job to `Failed` and stop dispatching it.
    async fn fail_job(&self, job_id: JobId, generation: u32, reason: String) -> Result<(), AppError> {
        self.dispatch.halt(job_id).await;

        let (job, changed) = update_job(self.store.as_ref(), job_id, |job| {
            if job.status != JobStatus::Running || job.generation != generation {
                return Ok(false);
            }
            job.transition(JobStatus::Failed, chrono::Utc::now())?;
            job.failure_reason = Some(reason.clone());
            Ok(true)
        })
        .await?;

        if changed {
            tracing::error!(
                "Job {} failed: {} (processed {}/{})",
                job_id,
                reason,
                job.processed,
                job.total
            );
        }
        Ok(())
    }

    /// Re-enqueue a record after `delay`, unless its job stopped meanwhile.
    fn schedule_retry(&self, item: WorkItem, delay: Duration) {
        let queue = Arc::clone(&self.queue);
        let dispatch = Arc::clone(&self.dispatch);
        let wake = Arc::clone(&self.scheduler_wake);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    dispatch.complete(item.job_id, &item.record.id, item.generation).await;
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            if dispatch
                .keep_for_retry(item.job_id, &item.record.id, item.generation)
                .await
            {
                queue.push(item).await;
            } else {
                wake.notify_one();
            }
        });
    }
}

/// How a dispatched record left the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    /// No longer in flight
    Done,
    /// Still in flight, waiting for a backoff retry
    RetryScheduled,
}
