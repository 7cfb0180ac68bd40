//! Batch engine configuration: worker pool sizing, retry policy,
//! timeouts, and admission thresholds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Worker pool and scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of concurrent worker slots (0 = available parallelism).
    #[serde(default)]
    pub pool_size: usize,
    /// Fraction of the pool a single job may occupy at once.
    #[serde(default = "default_per_job_cap_fraction")]
    pub per_job_cap_fraction: f64,
    /// Maximum number of simultaneously running jobs (0 = derived from the
    /// pool size and the per-job cap).
    #[serde(default)]
    pub max_running_jobs: usize,
    /// Attempts per record before a transient failure is final.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff, in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Upper bound for a single retry delay, in milliseconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
    /// Per-record processor timeout, in milliseconds.
    #[serde(default = "default_record_timeout")]
    pub record_timeout_ms: u64,
    /// Queue wait after which a job is promoted one priority level.
    #[serde(default = "default_starvation_threshold")]
    pub starvation_threshold_seconds: u64,
    /// Age of the last update after which a `Running` job counts as orphaned.
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_seconds: u64,
    /// Interval between orphan sweeps after startup (0 = startup only).
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,
    /// Fraction of `total` that may fail before the job is failed.
    /// `None` disables the threshold.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: Option<f64>,
    /// Scheduler housekeeping tick, in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 0,
            per_job_cap_fraction: default_per_job_cap_fraction(),
            max_running_jobs: 0,
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            record_timeout_ms: default_record_timeout(),
            starvation_threshold_seconds: default_starvation_threshold(),
            liveness_timeout_seconds: default_liveness_timeout(),
            reconcile_interval_seconds: default_reconcile_interval(),
            failure_threshold: default_failure_threshold(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl EngineConfig {
    /// Effective pool size, resolving `0` to the machine's parallelism.
    pub fn resolved_pool_size(&self) -> usize {
        if self.pool_size > 0 {
            return self.pool_size;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    /// Maximum number of worker slots one job may occupy.
    pub fn per_job_cap(&self) -> usize {
        let pool = self.resolved_pool_size();
        let cap = (pool as f64 * self.per_job_cap_fraction).floor() as usize;
        cap.clamp(1, pool)
    }

    /// Maximum number of jobs admitted to `Running` at once.
    pub fn resolved_max_running_jobs(&self) -> usize {
        if self.max_running_jobs > 0 {
            return self.max_running_jobs;
        }
        (self.resolved_pool_size() / self.per_job_cap()).max(1)
    }

    /// Per-record processor timeout.
    pub fn record_timeout(&self) -> Duration {
        Duration::from_millis(self.record_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based attempt that just failed).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.backoff_base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }

    /// Queue wait that triggers a starvation promotion.
    pub fn starvation_threshold(&self) -> Duration {
        Duration::from_secs(self.starvation_threshold_seconds)
    }

    /// Age after which a `Running` job with no updates is orphaned.
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_seconds)
    }

    /// Scheduler housekeeping tick.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.per_job_cap_fraction > 0.0 && self.per_job_cap_fraction <= 1.0) {
            return Err(AppError::configuration(format!(
                "engine.per_job_cap_fraction must be in (0, 1], got {}",
                self.per_job_cap_fraction
            )));
        }
        if self.max_attempts == 0 {
            return Err(AppError::configuration(
                "engine.max_attempts must be at least 1",
            ));
        }
        if let Some(threshold) = self.failure_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(AppError::configuration(format!(
                    "engine.failure_threshold must be in (0, 1], got {threshold}"
                )));
            }
        }
        Ok(())
    }
}

fn default_per_job_cap_fraction() -> f64 {
    0.5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    200
}

fn default_backoff_max() -> u64 {
    10_000
}

fn default_record_timeout() -> u64 {
    30_000
}

fn default_starvation_threshold() -> u64 {
    300
}

fn default_liveness_timeout() -> u64 {
    120
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_failure_threshold() -> Option<f64> {
    Some(0.5)
}

fn default_tick_interval() -> u64 {
    250
}
