//! End-to-end batch scenarios against a running engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use jobhub_core::config::EngineConfig;
use jobhub_entity::job::{JobPriority, JobStatus, JobType};
use jobhub_entity::record::ErrorClass;
use jobhub_worker::ProcessError;

use common::{Harness, SpyProcessor, test_config};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_permanent_record_error_completes_with_partial_failure() {
    let spy = Arc::new(SpyProcessor::new(JobType::GenerateForm, |id, _| {
        if id == "r-42" {
            Err(ProcessError::Permanent("malformed employee record".to_string()))
        } else {
            Ok(None)
        }
    }));
    let harness = Harness::start(test_config(8), vec![spy.clone()]);

    let id = harness.submit(JobType::GenerateForm, 100).await;
    let job = harness.wait_terminal(id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed, 100);
    assert_eq!(job.succeeded, 99);
    assert_eq!(job.failed, 1);
    assert!(job.failure_reason.is_none());
    assert_eq!(spy.calls_for("r-42"), 1);

    let errors = harness.service.list_outcomes(id, true).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].record_id.as_str(), "r-42");
    assert_eq!(errors[0].error_class, Some(ErrorClass::Permanent));

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transient_errors_are_retried_until_success() {
    let spy = Arc::new(SpyProcessor::new(JobType::ValidateData, |_, attempt| {
        if attempt < 3 {
            Err(ProcessError::Transient("validation service unavailable".to_string()))
        } else {
            Ok(None)
        }
    }));
    let harness = Harness::start(test_config(4), vec![spy.clone()]);

    let id = harness.submit(JobType::ValidateData, 20).await;
    let job = harness.wait_terminal(id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.succeeded, 20);
    assert_eq!(job.failed, 0);
    for i in 1..=20 {
        assert_eq!(spy.calls_for(&format!("r-{i}")), 3, "record r-{i}");
    }

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transient_errors_exhaust_attempts() {
    let spy = Arc::new(SpyProcessor::new(JobType::ImportRecords, |id, _| {
        if id == "r-3" {
            Err(ProcessError::Transient("upstream timeout".to_string()))
        } else {
            Ok(None)
        }
    }));
    let harness = Harness::start(test_config(4), vec![spy.clone()]);

    let id = harness.submit(JobType::ImportRecords, 5).await;
    let job = harness.wait_terminal(id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!((job.processed, job.succeeded, job.failed), (5, 4, 1));
    assert_eq!(spy.calls_for("r-3"), 3);

    let errors = harness.service.list_outcomes(id, true).await.unwrap();
    assert_eq!(errors[0].error_class, Some(ErrorClass::TransientExhausted));
    assert_eq!(errors[0].attempt, 3);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_record_timeout_counts_as_transient() {
    let spy = Arc::new(
        SpyProcessor::succeeding(JobType::ExportRecords).with_delay(Duration::from_millis(200)),
    );
    let config = EngineConfig {
        record_timeout_ms: 20,
        max_attempts: 2,
        ..test_config(2)
    };
    let harness = Harness::start(config, vec![spy.clone()]);

    let id = harness.submit(JobType::ExportRecords, 1).await;
    let job = harness.wait_terminal(id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed, 1);
    assert_eq!(spy.calls_for("r-1"), 2);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_stops_progress_and_resume_finishes() {
    let spy = Arc::new(
        SpyProcessor::succeeding(JobType::CorrectionBatch).with_delay(Duration::from_millis(2)),
    );
    let harness = Harness::start(test_config(4), vec![spy.clone()]);

    let id = harness.submit(JobType::CorrectionBatch, 200).await;
    harness
        .wait_for(id, Duration::from_secs(10), |job| job.processed >= 100)
        .await;

    let paused = harness.service.pause(id).await.unwrap();
    assert_eq!(paused.status, JobStatus::Paused);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = harness.service.get_status(id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let later = harness.service.get_status(id).await.unwrap();
    assert_eq!(later.status, JobStatus::Paused);
    assert_eq!(later.processed, settled.processed);
    assert!(later.processed < 200);

    let resumed = harness.service.resume(id).await.unwrap();
    assert_eq!(resumed.status, JobStatus::Queued);

    let job = harness.wait_terminal(id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed, 200);
    assert_eq!(job.succeeded, 200);
    assert_eq!(spy.total_calls(), 200);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fatal_error_fails_job_without_further_dispatch() {
    let spy = Arc::new(
        SpyProcessor::new(JobType::GenerateForm, |id, _| {
            if id == "r-1" {
                Err(ProcessError::Fatal("signing certificate rejected".to_string()))
            } else {
                Ok(None)
            }
        })
        .with_delay(Duration::from_millis(1)),
    );
    let harness = Harness::start(test_config(4), vec![spy.clone()]);

    let id = harness.submit(JobType::GenerateForm, 1000).await;
    let job = harness
        .wait_for(id, Duration::from_secs(2), |job| job.status == JobStatus::Failed)
        .await;

    assert_eq!(
        job.failure_reason.as_deref(),
        Some("signing certificate rejected")
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    let job = harness.service.get_status(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.processed <= 10, "processed {} after fatal", job.processed);
    assert!(spy.total_calls() <= 10);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_threshold_fails_job() {
    let spy = Arc::new(SpyProcessor::new(JobType::ValidateData, |_, _| {
        Err(ProcessError::Permanent("missing SSN".to_string()))
    }));
    let harness = Harness::start(test_config(2), vec![spy.clone()]);

    let id = harness.submit(JobType::ValidateData, 10).await;
    let job = harness.wait_terminal(id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.failure_reason.as_deref(),
        Some("failure threshold exceeded")
    );
    assert!(job.failed as f64 / job.total as f64 > 0.5);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_job_concurrency_cap() {
    let forms = Arc::new(
        SpyProcessor::succeeding(JobType::GenerateForm).with_delay(Duration::from_millis(5)),
    );
    let checks = Arc::new(
        SpyProcessor::succeeding(JobType::ValidateData).with_delay(Duration::from_millis(5)),
    );
    let harness = Harness::start(test_config(10), vec![forms.clone(), checks.clone()]);

    let a = harness.submit(JobType::GenerateForm, 150).await;
    let b = harness.submit(JobType::ValidateData, 150).await;
    harness.wait_terminal(a).await;
    harness.wait_terminal(b).await;

    assert!(forms.peak_concurrency() <= 5, "peak {}", forms.peak_concurrency());
    assert!(checks.peak_concurrency() <= 5, "peak {}", checks.peak_concurrency());
    assert!(forms.peak_concurrency() > 1);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_higher_priority_is_admitted_first() {
    let spy = Arc::new(
        SpyProcessor::succeeding(JobType::ExportRecords).with_delay(Duration::from_millis(20)),
    );
    let config = EngineConfig {
        max_running_jobs: 1,
        ..test_config(2)
    };
    let harness = Harness::start(config, vec![spy.clone()]);

    let blocker = harness.submit(JobType::ExportRecords, 4).await;
    let low = harness
        .submit_with_priority(JobType::ExportRecords, 2, JobPriority::Low)
        .await;
    let critical = harness
        .submit_with_priority(JobType::ExportRecords, 2, JobPriority::Critical)
        .await;

    harness.wait_terminal(blocker).await;
    let low = harness.wait_terminal(low).await;
    let critical = harness.wait_terminal(critical).await;

    assert!(critical.started_at < low.started_at);

    harness.stop().await;
}
