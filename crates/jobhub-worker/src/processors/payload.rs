//! Generic payload processor: checks that each record carries the fields
//! its job type needs and echoes a normalized copy as output.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing;

use jobhub_entity::job::{Job, JobType};
use jobhub_entity::record::Record;

use crate::processor::{ProcessContext, ProcessError, RecordProcessor};

/// Processor that validates record payloads against a list of required
/// top-level fields.
#[derive(Debug, Clone)]
pub struct PayloadProcessor {
    /// Job type served
    job_type: JobType,
    /// Fields every payload must contain with a non-null value
    required_fields: Vec<String>,
}

impl PayloadProcessor {
    /// Create a processor for `job_type` with no required fields
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            required_fields: Vec::new(),
        }
    }

    /// Require `fields` on every payload
    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Default processor set, one per job type.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(JobType::GenerateForm).with_required_fields(["employee_id", "tax_year"]),
            Self::new(JobType::ValidateData).with_required_fields(["employee_id"]),
            Self::new(JobType::ImportRecords),
            Self::new(JobType::ExportRecords),
            Self::new(JobType::CorrectionBatch).with_required_fields(["employee_id", "correction"]),
        ]
    }

    fn check(&self, payload: &Value) -> Result<Map<String, Value>, ProcessError> {
        let Value::Object(fields) = payload else {
            return Err(ProcessError::Permanent(
                "payload must be a JSON object".to_string(),
            ));
        };

        let missing: Vec<&str> = self
            .required_fields
            .iter()
            .filter(|f| fields.get(f.as_str()).is_none_or(Value::is_null))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ProcessError::Permanent(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        Ok(fields.clone())
    }
}

#[async_trait]
impl RecordProcessor for PayloadProcessor {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn process(
        &self,
        ctx: &ProcessContext,
        job: &Job,
        record: &Record,
    ) -> Result<Option<Value>, ProcessError> {
        if ctx.shutdown.is_cancelled() {
            return Err(ProcessError::Transient("engine is shutting down".to_string()));
        }

        let mut fields = self.check(&record.payload)?;
        fields.insert("job_type".to_string(), Value::from(job.job_type.as_str()));
        fields.insert("generation".to_string(), Value::from(ctx.generation));

        tracing::trace!(
            "Processed record '{}' of job {} (attempt {})",
            record.id,
            job.id,
            ctx.attempt
        );

        Ok(Some(Value::Object(fields)))
    }
}
