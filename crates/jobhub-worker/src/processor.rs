//! Record processors, one per job type, dispatched through a registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing;

use jobhub_core::error::AppError;
use jobhub_core::types::JobId;
use jobhub_entity::job::{Job, JobType};
use jobhub_entity::record::Record;

/// Per-invocation context handed to a processor.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    /// Job being processed.
    pub job_id: JobId,
    /// Job generation this invocation belongs to.
    pub generation: u32,
    /// Attempt number for this record within the generation (1-based).
    pub attempt: u32,
    /// Fires when the engine is shutting down.
    pub shutdown: CancellationToken,
}

/// Trait for record processor implementations.
///
/// A processor must be safe to call concurrently for different records of
/// the same job, must be idempotent for the same `(job_id, record_id)`, and
/// must only report an outcome; the engine owns all job bookkeeping.
#[async_trait]
pub trait RecordProcessor: Send + Sync + std::fmt::Debug {
    /// Get the job type this processor handles
    fn job_type(&self) -> JobType;

    /// Process one record, optionally returning output for the audit trail
    async fn process(
        &self,
        ctx: &ProcessContext,
        job: &Job,
        record: &Record,
    ) -> Result<Option<Value>, ProcessError>;
}

/// Failure reported by a processor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// Retryable, e.g. a dependency is momentarily unavailable
    #[error("Transient record failure: {0}")]
    Transient(String),

    /// This record can never succeed, e.g. malformed input
    #[error("Permanent record failure: {0}")]
    Permanent(String),

    /// The entire job must stop, e.g. bad credentials affecting all records
    #[error("Fatal job failure: {0}")]
    Fatal(String),
}

impl ProcessError {
    /// The message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Permanent(msg) | Self::Fatal(msg) => msg,
        }
    }
}

/// Maps each job type to exactly one processor.
#[derive(Debug, Default)]
pub struct ProcessorRegistry {
    /// Registered processors by type
    processors: HashMap<JobType, Arc<dyn RecordProcessor>>,
}

impl ProcessorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Register a processor. A second processor for the same type is rejected.
    pub fn register(&mut self, processor: Arc<dyn RecordProcessor>) -> Result<(), AppError> {
        let job_type = processor.job_type();
        if self.processors.contains_key(&job_type) {
            return Err(AppError::conflict(format!(
                "A processor is already registered for job type '{}'",
                job_type
            )));
        }
        tracing::info!("Registered record processor for type '{}'", job_type);
        self.processors.insert(job_type, processor);
        Ok(())
    }

    /// Look up the processor for a job type
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn RecordProcessor>> {
        self.processors.get(&job_type).cloned()
    }

    /// Check if a processor is registered for a job type
    pub fn has_processor(&self, job_type: JobType) -> bool {
        self.processors.contains_key(&job_type)
    }

    /// Get the list of registered job types
    pub fn registered_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.processors.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Noop(JobType);

    #[async_trait]
    impl RecordProcessor for Noop {
        fn job_type(&self) -> JobType {
            self.0
        }

        async fn process(
            &self,
            _ctx: &ProcessContext,
            _job: &Job,
            _record: &Record,
        ) -> Result<Option<Value>, ProcessError> {
            Ok(None)
        }
    }

    #[test]
    fn test_register_rejects_duplicate_type() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register(Arc::new(Noop(JobType::ValidateData)))
            .unwrap();
        let err = registry
            .register(Arc::new(Noop(JobType::ValidateData)))
            .unwrap_err();
        assert!(err.is(jobhub_core::error::ErrorKind::Conflict));
        assert!(registry.has_processor(JobType::ValidateData));
        assert!(!registry.has_processor(JobType::ExportRecords));
    }

    #[test]
    fn test_error_message_strips_prefix() {
        let err = ProcessError::Permanent("missing SSN".to_string());
        assert_eq!(err.message(), "missing SSN");
        assert_eq!(err.to_string(), "Permanent record failure: missing SSN");
    }
}
