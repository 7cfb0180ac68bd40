//! Shared fixtures for engine scenario tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::watch;

use jobhub_core::config::EngineConfig;
use jobhub_core::types::JobId;
use jobhub_entity::job::{Job, JobPriority, JobType};
use jobhub_entity::record::Record;
use jobhub_service::{JobService, RecordSource, SubmitJob};
use jobhub_store::{JobStore, MemoryJobStore};
use jobhub_worker::{
    Engine, EngineHandle, ProcessContext, ProcessError, ProcessorRegistry, RecordProcessor,
};

pub type Behavior = dyn Fn(&str, u32) -> Result<Option<Value>, ProcessError> + Send + Sync;

/// Processor that records every invocation and the peak number of
/// concurrent invocations.
pub struct SpyProcessor {
    job_type: JobType,
    behavior: Box<Behavior>,
    delay: Duration,
    calls: Mutex<HashMap<String, u32>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl fmt::Debug for SpyProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpyProcessor")
            .field("job_type", &self.job_type)
            .field("delay", &self.delay)
            .finish()
    }
}

impl SpyProcessor {
    pub fn new<F>(job_type: JobType, behavior: F) -> Self
    where
        F: Fn(&str, u32) -> Result<Option<Value>, ProcessError> + Send + Sync + 'static,
    {
        Self {
            job_type,
            behavior: Box::new(behavior),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// A processor that always succeeds.
    pub fn succeeding(job_type: JobType) -> Self {
        Self::new(job_type, |_, _| Ok(None))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Invocations for one record.
    pub fn calls_for(&self, record_id: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(record_id)
            .copied()
            .unwrap_or(0)
    }

    /// Invocations across all records.
    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    /// Highest number of concurrent invocations observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordProcessor for SpyProcessor {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn process(
        &self,
        _ctx: &ProcessContext,
        _job: &Job,
        record: &Record,
    ) -> Result<Option<Value>, ProcessError> {
        let attempt_no = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(record.id.as_str().to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.behavior)(record.id.as_str(), attempt_no);

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Engine configuration tuned for fast tests.
pub fn test_config(pool_size: usize) -> EngineConfig {
    EngineConfig {
        pool_size,
        backoff_base_ms: 5,
        backoff_max_ms: 20,
        record_timeout_ms: 2_000,
        tick_interval_ms: 10,
        ..EngineConfig::default()
    }
}

/// A running engine plus the service in front of it.
pub struct Harness {
    pub service: JobService,
    pub store: Arc<dyn JobStore>,
    pub shutdown: watch::Sender<bool>,
    pub handle: Option<EngineHandle>,
}

impl Harness {
    pub fn start(config: EngineConfig, processors: Vec<Arc<dyn RecordProcessor>>) -> Self {
        Self::start_with_store(Arc::new(MemoryJobStore::new()), config, processors)
    }

    pub fn start_with_store(
        store: Arc<dyn JobStore>,
        config: EngineConfig,
        processors: Vec<Arc<dyn RecordProcessor>>,
    ) -> Self {
        let mut registry = ProcessorRegistry::new();
        for processor in processors {
            registry.register(processor).unwrap();
        }
        let engine = Engine::new(Arc::clone(&store), registry, config).unwrap();
        let (shutdown, rx) = watch::channel(false);
        let handle = engine.start(rx);
        Self {
            service: JobService::new(&engine),
            store,
            shutdown,
            handle: Some(handle),
        }
    }

    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            handle.join().await;
        }
    }

    /// Submit `n` records named `r-1..=r-n`.
    pub async fn submit(&self, job_type: JobType, n: usize) -> JobId {
        self.submit_with_priority(job_type, n, JobPriority::Normal)
            .await
    }

    pub async fn submit_with_priority(
        &self,
        job_type: JobType,
        n: usize,
        priority: JobPriority,
    ) -> JobId {
        self.service
            .submit(SubmitJob {
                job_type,
                name: format!("{n} record batch"),
                priority,
                created_by: "test".to_string(),
                source: RecordSource::Inline(records(n)),
            })
            .await
            .unwrap()
    }

    /// Poll until `predicate` holds, asserting counter invariants on every
    /// snapshot seen.
    pub async fn wait_for<P>(&self, id: JobId, timeout: Duration, predicate: P) -> Job
    where
        P: Fn(&Job) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.service.get_status(id).await.unwrap();
            assert_invariants(&job);
            if predicate(&job) {
                return job;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting on job {id}: {job:?}");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn wait_terminal(&self, id: JobId) -> Job {
        self.wait_for(id, Duration::from_secs(10), Job::is_terminal)
            .await
    }
}

pub fn records(n: usize) -> Vec<Record> {
    (1..=n)
        .map(|i| Record::new(format!("r-{i}"), json!({ "seq": i })))
        .collect()
}

pub fn assert_invariants(job: &Job) {
    assert!(
        job.processed == job.succeeded + job.failed,
        "processed != succeeded + failed: {job:?}"
    );
    assert!(job.processed <= job.total, "processed > total: {job:?}");
}
