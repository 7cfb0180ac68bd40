//! Engine assembly: one store, one registry, one pool, one scheduler.

use std::sync::Arc;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing;

use jobhub_core::config::EngineConfig;
use jobhub_core::error::AppError;
use jobhub_store::JobStore;

use crate::dispatch::DispatchTable;
use crate::pool::WorkerPool;
use crate::processor::ProcessorRegistry;
use crate::queue::WorkQueue;
use crate::scheduler::JobScheduler;

/// The batch engine's long-lived components.
#[derive(Debug, Clone)]
pub struct Engine {
    /// Job state store
    pub store: Arc<dyn JobStore>,
    /// Processors by job type
    pub registry: Arc<ProcessorRegistry>,
    /// Job scheduler
    pub scheduler: Arc<JobScheduler>,
    /// Worker pool
    pub pool: Arc<WorkerPool>,
    /// Engine configuration
    pub config: EngineConfig,
}

/// Running engine tasks.
#[derive(Debug)]
pub struct EngineHandle {
    scheduler: JoinHandle<()>,
    pool: JoinHandle<()>,
}

impl EngineHandle {
    /// Wait for the scheduler and the pool to stop.
    pub async fn join(self) {
        if let Err(e) = self.scheduler.await {
            tracing::error!("Scheduler task failed: {}", e);
        }
        if let Err(e) = self.pool.await {
            tracing::error!("Worker pool task failed: {}", e);
        }
    }
}

impl Engine {
    /// Wire the engine's components together.
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: ProcessorRegistry,
        config: EngineConfig,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let registry = Arc::new(registry);
        let queue = Arc::new(WorkQueue::new());
        let dispatch = Arc::new(DispatchTable::new());
        let wake = Arc::new(Notify::new());

        let scheduler = Arc::new(JobScheduler::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&dispatch),
            Arc::clone(&wake),
            config.clone(),
        ));
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            queue,
            dispatch,
            wake,
            config.clone(),
        ));

        Ok(Self {
            store,
            registry,
            scheduler,
            pool,
            config,
        })
    }

    /// Start the scheduler and the worker pool.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> EngineHandle {
        tracing::info!(
            "Starting batch engine with processors for {:?}",
            self.registry
                .registered_types()
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
        );
        EngineHandle {
            scheduler: self.scheduler.start(shutdown.clone()),
            pool: self.pool.start(shutdown),
        }
    }
}
