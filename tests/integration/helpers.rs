//! Shared test helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt;

use jobhub_api::{AppState, build_app};
use jobhub_core::config::{AppConfig, EngineConfig};
use jobhub_service::JobService;
use jobhub_store::{JobStore, MemoryJobStore};
use jobhub_worker::processors::PayloadProcessor;
use jobhub_worker::{Engine, ProcessorRegistry};

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    shutdown: watch::Sender<bool>,
}

/// Captured response
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Parsed JSON body, `Null` when the body is not JSON
    pub body: Value,
    /// Raw body text
    pub text: String,
}

impl TestApp {
    /// Create a new test application with the built-in processors
    pub async fn new() -> Self {
        let mut config = AppConfig::default();
        config.engine = EngineConfig {
            pool_size: 4,
            backoff_base_ms: 5,
            backoff_max_ms: 20,
            record_timeout_ms: 2_000,
            tick_interval_ms: 10,
            ..EngineConfig::default()
        };

        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let mut registry = ProcessorRegistry::new();
        for processor in PayloadProcessor::defaults() {
            registry
                .register(Arc::new(processor))
                .expect("register processor");
        }

        let engine = Engine::new(store, registry, config.engine.clone()).expect("engine");
        let (shutdown, rx) = watch::channel(false);
        let _handle = engine.start(rx);

        let jobs = Arc::new(JobService::new(&engine));
        let router = build_app(
            AppState::new(Arc::new(config.clone()), jobs),
            &config.server.cors,
        );

        Self { router, shutdown }
    }

    /// Send a request and capture the response
    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse { status, body, text }
    }

    /// Submit a `generate_form` job and return its id
    pub async fn submit(&self, name: &str, records: Value) -> String {
        let response = self
            .request(
                "POST",
                "/api/jobs",
                Some(json!({
                    "type": "generate_form",
                    "name": name,
                    "priority": "high",
                    "created_by": "HR Manager",
                    "records": records,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
        response.body["data"]["job_id"]
            .as_str()
            .expect("job id")
            .to_string()
    }

    /// Poll a job until it reports `status`
    pub async fn wait_for_status(&self, id: &str, status: &str) -> Value {
        for _ in 0..500 {
            let response = self.request("GET", &format!("/api/jobs/{id}"), None).await;
            if response.body["data"]["status"] == status {
                return response.body["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached {status}");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// `n` well-formed 1095-C records
pub fn employee_records(n: usize) -> Vec<Value> {
    (1..=n)
        .map(|i| {
            json!({
                "id": format!("emp-{i}"),
                "payload": { "employee_id": format!("E{i:04}"), "tax_year": 2025 }
            })
        })
        .collect()
}
