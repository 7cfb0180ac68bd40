//! Job type identifiers, one per registered record processor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of batch job; selects the record processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Generate one form per record.
    GenerateForm,
    /// Validate record data.
    ValidateData,
    /// Import records from an upstream system.
    ImportRecords,
    /// Export records for distribution.
    ExportRecords,
    /// Apply a batch of corrections.
    CorrectionBatch,
}

impl JobType {
    /// All job types.
    pub const ALL: [JobType; 5] = [
        Self::GenerateForm,
        Self::ValidateData,
        Self::ImportRecords,
        Self::ExportRecords,
        Self::CorrectionBatch,
    ];

    /// Return the job type as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateForm => "generate_form",
            Self::ValidateData => "validate_data",
            Self::ImportRecords => "import_records",
            Self::ExportRecords => "export_records",
            Self::CorrectionBatch => "correction_batch",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown job type '{s}'"))
    }
}
