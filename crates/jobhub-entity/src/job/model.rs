//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobhub_core::error::AppError;
use jobhub_core::types::JobId;

use super::kind::JobType;
use super::status::{JobPriority, JobStatus};
use crate::record::OutcomeStatus;

/// A batch job: metadata, lifecycle status, and progress counters.
///
/// Invariant: `processed == succeeded + failed` and `processed <= total`.
/// Every accepted store mutation bumps `revision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Job type; selects the record processor.
    pub job_type: JobType,
    /// Human-readable name shown in the queue view.
    pub name: String,
    /// Priority requested at submission.
    pub priority: JobPriority,
    /// Priority used for admission, raised by the starvation guard.
    pub effective_priority: JobPriority,
    /// Identity of the submitter.
    pub created_by: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Number of records in the job.
    pub total: u64,
    /// False while a streaming source is still being ingested.
    pub total_known: bool,
    /// Records with a terminal outcome.
    pub processed: u64,
    /// Records whose latest outcome is a success.
    pub succeeded: u64,
    /// Records whose latest outcome is an error.
    pub failed: u64,
    /// Attempt generation, incremented by every retry.
    pub generation: u32,
    /// Reason the job failed, if it did.
    pub failure_reason: Option<String>,
    /// Optimistic-concurrency revision.
    pub revision: u64,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// When the job last entered `Queued`; drives starvation promotion.
    pub queued_at: DateTime<Utc>,
    /// When the job was first admitted.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Last mutation time; used as the liveness heartbeat.
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    /// Job type.
    pub job_type: JobType,
    /// Job name.
    pub name: String,
    /// Priority.
    pub priority: JobPriority,
    /// Submitter identity.
    pub created_by: String,
    /// Known record count (0 for a streaming source).
    pub total: u64,
    /// Whether `total` is final.
    pub total_known: bool,
}

impl Job {
    /// Build a freshly queued job at revision 0.
    pub fn new(create: CreateJob, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            job_type: create.job_type,
            name: create.name,
            priority: create.priority,
            effective_priority: create.priority,
            created_by: create.created_by,
            status: JobStatus::Queued,
            total: create.total,
            total_known: create.total_known,
            processed: 0,
            succeeded: 0,
            failed: 0,
            generation: 1,
            failure_reason: None,
            revision: 0,
            created_at: now,
            queued_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the job can be retried.
    pub fn can_retry(&self) -> bool {
        self.status.can_retry()
    }

    /// Records without a terminal outcome.
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.processed)
    }

    /// Move to `next`, enforcing the state machine and stamping timestamps.
    pub fn transition(&mut self, next: JobStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::invalid_state(format!(
                "Job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        match next {
            JobStatus::Queued => {
                self.queued_at = now;
                self.finished_at = None;
            }
            JobStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                self.finished_at = Some(now);
            }
            JobStatus::Paused => {}
        }

        self.status = next;
        Ok(())
    }

    /// Fold one recorded outcome into the counters.
    ///
    /// `previous` is the record's latest outcome before this one. Returns
    /// `false` when the counters are unchanged.
    pub fn apply_outcome(&mut self, previous: Option<OutcomeStatus>, outcome: OutcomeStatus) -> bool {
        match (previous, outcome) {
            (None, _) if self.processed >= self.total => false,
            (None, OutcomeStatus::Success) => {
                self.processed += 1;
                self.succeeded += 1;
                true
            }
            (None, OutcomeStatus::Error) => {
                self.processed += 1;
                self.failed += 1;
                true
            }
            (Some(OutcomeStatus::Error), OutcomeStatus::Success) => {
                self.failed = self.failed.saturating_sub(1);
                self.succeeded += 1;
                true
            }
            (Some(OutcomeStatus::Error), OutcomeStatus::Error)
            | (Some(OutcomeStatus::Success), _) => false,
        }
    }

    /// Fraction of `total` that has failed.
    pub fn failure_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.failed as f64 / self.total as f64
    }

    /// Whether the counters satisfy the progress invariant.
    pub fn counters_consistent(&self) -> bool {
        self.processed == self.succeeded + self.failed && self.processed <= self.total
    }

    /// Completion percentage in `0.0..=100.0`.
    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 {
            return if self.status == JobStatus::Completed {
                100.0
            } else {
                0.0
            };
        }
        (self.processed as f64 / self.total as f64 * 100.0).min(100.0)
    }

    /// Estimated seconds until completion, from throughput since start.
    pub fn estimated_completion_seconds(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.status != JobStatus::Running || self.processed == 0 {
            return None;
        }
        let started = self.started_at?;
        let elapsed_ms = (now - started).num_milliseconds().max(1) as f64;
        let per_record_ms = elapsed_ms / self.processed as f64;
        Some((per_record_ms * self.remaining() as f64 / 1000.0).ceil() as u64)
    }
}
