//! Progress streams, outcome listings, statistics and streaming ingestion.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;

use jobhub_core::error::AppError;
use jobhub_entity::job::{JobPriority, JobStatus, JobType};
use jobhub_service::{RecordSource, SubmitJob};
use jobhub_worker::ProcessError;

use common::{Harness, SpyProcessor, assert_invariants, records, test_config};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_stream_ends_on_terminal_snapshot() {
    let spy = Arc::new(
        SpyProcessor::succeeding(JobType::ValidateData).with_delay(Duration::from_millis(2)),
    );
    let harness = Harness::start(test_config(4), vec![spy]);
    let id = harness.submit(JobType::ValidateData, 50).await;

    let snapshots: Vec<_> = tokio::time::timeout(
        Duration::from_secs(10),
        harness.service.stream_progress(id).await.unwrap().collect::<Vec<_>>(),
    )
    .await
    .unwrap();

    assert!(!snapshots.is_empty());
    let last = snapshots.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.processed, 50);

    for pair in snapshots.windows(2) {
        assert!(pair[0].revision < pair[1].revision);
        assert!(pair[0].processed <= pair[1].processed);
    }
    snapshots.iter().for_each(assert_invariants);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_outcomes_stats_and_listing() {
    let spy = Arc::new(SpyProcessor::new(JobType::ImportRecords, |id, _| {
        if id == "r-2" {
            Err(ProcessError::Permanent("bad row".to_string()))
        } else {
            Ok(Some(serde_json::json!({ "imported": id })))
        }
    }));
    let harness = Harness::start(test_config(2), vec![spy]);

    let first = harness.submit(JobType::ImportRecords, 4).await;
    harness.wait_terminal(first).await;
    let second = harness.submit(JobType::ImportRecords, 3).await;
    harness.wait_terminal(second).await;

    let all = harness.service.list_outcomes(first, false).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|o| o.record_id.as_str()).collect();
    assert_eq!(ids, vec!["r-1", "r-2", "r-3", "r-4"]);
    assert_eq!(all[0].output, Some(serde_json::json!({ "imported": "r-1" })));

    let errors = harness.service.list_outcomes(first, true).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message.as_deref(), Some("bad row"));

    let jobs = harness.service.list_jobs(None).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, second);
    let completed = harness
        .service
        .list_jobs(Some(JobStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 2);
    assert!(
        harness
            .service
            .list_jobs(Some(JobStatus::Running))
            .await
            .unwrap()
            .is_empty()
    );

    let stats = harness.service.stats().await.unwrap();
    assert_eq!(stats.total_jobs, 2);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.records_total, 7);
    assert_eq!(stats.records_failed, 2);
    assert_eq!(stats.pool_size, 2);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_streamed_records_are_ingested_before_admission() {
    let spy = Arc::new(SpyProcessor::succeeding(JobType::ExportRecords));
    let harness = Harness::start(test_config(4), vec![spy.clone()]);

    let source = stream::iter(records(600).into_iter().map(Ok)).boxed();
    let id = harness
        .service
        .submit(SubmitJob {
            job_type: JobType::ExportRecords,
            name: "Export all employees".to_string(),
            priority: JobPriority::Low,
            created_by: "Benefits Admin".to_string(),
            source: RecordSource::Stream(source),
        })
        .await
        .unwrap();

    let job = harness.wait_terminal(id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total, 600);
    assert!(job.total_known);
    assert_eq!(job.succeeded, 600);
    assert_eq!(spy.total_calls(), 600);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broken_stream_fails_queued_job() {
    let spy = Arc::new(SpyProcessor::succeeding(JobType::ExportRecords));
    let harness = Harness::start(test_config(2), vec![spy.clone()]);

    let mut items: Vec<Result<_, AppError>> = records(3).into_iter().map(Ok).collect();
    items.push(Err(AppError::storage("source file truncated")));
    let id = harness
        .service
        .submit(SubmitJob {
            job_type: JobType::ExportRecords,
            name: "Export from truncated file".to_string(),
            priority: JobPriority::Normal,
            created_by: "Benefits Admin".to_string(),
            source: RecordSource::Stream(stream::iter(items).boxed()),
        })
        .await
        .unwrap();

    let job = harness.wait_terminal(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(
        job.failure_reason
            .as_deref()
            .is_some_and(|r| r.starts_with("record ingestion failed"))
    );
    assert_eq!(spy.total_calls(), 0);

    let err = harness.service.retry(id).await.unwrap_err();
    assert!(err.is(jobhub_core::error::ErrorKind::InvalidState));

    harness.stop().await;
}
