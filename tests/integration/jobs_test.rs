//! Integration tests for job endpoints.

use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::helpers::{TestApp, employee_records};

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;

    let response = app.request("GET", "/api/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_submit_and_complete_with_partial_failure() {
    let app = TestApp::new().await;
    let mut records = employee_records(4);
    records.push(json!({ "id": "emp-broken", "payload": { "employee_id": "E9999" } }));

    let id = app.submit("2025 1095-C Generation", Value::Array(records)).await;
    let job = app.wait_for_status(&id, "completed").await;

    assert_eq!(job["total"], 5);
    assert_eq!(job["processed"], 5);
    assert_eq!(job["succeeded"], 4);
    assert_eq!(job["failed"], 1);
    assert_eq!(job["progress_percent"], 100.0);

    let errors = app
        .request("GET", &format!("/api/jobs/{id}/outcomes?errors_only=true"), None)
        .await;
    assert_eq!(errors.status, StatusCode::OK);
    let errors = errors.body["data"].as_array().expect("outcomes").clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["record_id"], "emp-broken");
    assert_eq!(errors[0]["error_class"], "permanent");

    let all = app
        .request("GET", &format!("/api/jobs/{id}/outcomes"), None)
        .await;
    assert_eq!(all.body["data"].as_array().map(Vec::len), Some(5));
}

#[tokio::test]
async fn test_submit_rejects_invalid_requests() {
    let app = TestApp::new().await;

    let empty = app
        .request(
            "POST",
            "/api/jobs",
            Some(json!({ "type": "generate_form", "name": "Empty", "records": [] })),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.body["error"], "VALIDATION_ERROR");
    assert!(empty.body["details"]["records"].is_array());

    let unknown_type = app
        .request(
            "POST",
            "/api/jobs",
            Some(json!({ "type": "bake_bread", "name": "x", "records": employee_records(1) })),
        )
        .await;
    assert_eq!(unknown_type.status, StatusCode::BAD_REQUEST);

    let duplicate = app
        .request(
            "POST",
            "/api/jobs",
            Some(json!({
                "type": "generate_form",
                "name": "Dupes",
                "records": [
                    { "id": "a", "payload": {} },
                    { "id": "a", "payload": {} }
                ]
            })),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let app = TestApp::new().await;

    let missing = app
        .request("GET", "/api/jobs/00000000-0000-0000-0000-999999999999", None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["error"], "NOT_FOUND");

    let malformed = app.request("POST", "/api/jobs/not-a-job/pause", None).await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_control_on_completed_job() {
    let app = TestApp::new().await;
    let id = app
        .submit("Data Validation", Value::Array(employee_records(3)))
        .await;
    app.wait_for_status(&id, "completed").await;

    let cancel = app
        .request("POST", &format!("/api/jobs/{id}/cancel"), None)
        .await;
    assert_eq!(cancel.status, StatusCode::CONFLICT);
    assert_eq!(cancel.body["error"], "INVALID_STATE");

    let retry = app
        .request("POST", &format!("/api/jobs/{id}/retry"), None)
        .await;
    assert_eq!(retry.status, StatusCode::CONFLICT);

    let resume = app
        .request("POST", &format!("/api/jobs/{id}/resume"), None)
        .await;
    assert_eq!(resume.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_and_stats() {
    let app = TestApp::new().await;
    let first = app.submit("January", Value::Array(employee_records(2))).await;
    let second = app.submit("February", Value::Array(employee_records(2))).await;
    app.wait_for_status(&first, "completed").await;
    app.wait_for_status(&second, "completed").await;

    let list = app.request("GET", "/api/jobs?status=completed", None).await;
    assert_eq!(list.status, StatusCode::OK);
    let jobs = list.body["data"].as_array().expect("jobs").clone();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["id"], second.as_str());

    let none = app.request("GET", "/api/jobs?status=paused", None).await;
    assert_eq!(none.body["data"].as_array().map(Vec::len), Some(0));

    let bad = app.request("GET", "/api/jobs?status=sleeping", None).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);

    let stats = app.request("GET", "/api/stats", None).await;
    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["data"]["total_jobs"], 2);
    assert_eq!(stats.body["data"]["completed"], 2);
    assert_eq!(stats.body["data"]["records_succeeded"], 4);
    assert_eq!(stats.body["data"]["pool_size"], 4);
}

#[tokio::test]
async fn test_progress_stream_ends_after_terminal_snapshot() {
    let app = TestApp::new().await;
    let id = app
        .submit("Streamed", Value::Array(employee_records(3)))
        .await;
    app.wait_for_status(&id, "completed").await;

    let response = app
        .request("GET", &format!("/api/jobs/{id}/stream"), None)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains("event: progress"));
    assert!(response.text.contains("\"status\":\"completed\""));
}
