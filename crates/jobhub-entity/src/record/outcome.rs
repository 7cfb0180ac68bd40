//! Per-record outcomes, retained for audit and selective retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::model::RecordId;

/// Terminal result of processing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// The processor succeeded.
    Success,
    /// The record failed for good in this generation.
    Error,
}

/// Why a record ended in `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The record can never succeed.
    Permanent,
    /// Transient failures (including timeouts) used up every attempt.
    TransientExhausted,
    /// The record raised a job-level fatal error.
    Fatal,
}

impl ErrorClass {
    /// Return the class as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::TransientExhausted => "transient_exhausted",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded outcome. Outcomes are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// The record this outcome belongs to.
    pub record_id: RecordId,
    /// Job generation that produced the outcome.
    pub generation: u32,
    /// Attempt number within the generation (1-based).
    pub attempt: u32,
    /// Success or error.
    pub status: OutcomeStatus,
    /// Error classification, for `Error` outcomes.
    pub error_class: Option<ErrorClass>,
    /// Error message, for `Error` outcomes.
    pub message: Option<String>,
    /// Optional processor output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// When the outcome was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl RecordOutcome {
    /// A successful outcome.
    pub fn success(
        record_id: RecordId,
        generation: u32,
        attempt: u32,
        output: Option<serde_json::Value>,
    ) -> Self {
        Self {
            record_id,
            generation,
            attempt,
            status: OutcomeStatus::Success,
            error_class: None,
            message: None,
            output,
            recorded_at: Utc::now(),
        }
    }

    /// A failed outcome.
    pub fn error(
        record_id: RecordId,
        generation: u32,
        attempt: u32,
        class: ErrorClass,
        message: impl Into<String>,
    ) -> Self {
        Self {
            record_id,
            generation,
            attempt,
            status: OutcomeStatus::Error,
            error_class: Some(class),
            message: Some(message.into()),
            output: None,
            recorded_at: Utc::now(),
        }
    }

    /// Whether this outcome is a success.
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
