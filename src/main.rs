//! JobHub Server: batch job processing engine with an HTTP control API.
//!
//! Main entry point that wires the store, engine, service and router
//! together and runs until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use jobhub_api::{AppState, build_app};
use jobhub_core::config::AppConfig;
use jobhub_core::error::AppError;
use jobhub_service::JobService;
use jobhub_store::{JobStore, MemoryJobStore, snapshot};
use jobhub_worker::processors::PayloadProcessor;
use jobhub_worker::{Engine, ProcessorRegistry};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let dir = std::env::var("JOBHUB_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let env = std::env::var("JOBHUB_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load_from(&dir, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting JobHub v{}", env!("CARGO_PKG_VERSION"));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 1: Job state store ──────────────────────────────────
    let (memory, snapshot_task) = match &config.store.snapshot_path {
        Some(path) => {
            let path = PathBuf::from(path);
            let memory = snapshot::open(&path).await?;
            let task = snapshot::spawn_snapshot_task(
                memory.clone(),
                path,
                Duration::from_secs(config.store.snapshot_interval_seconds.max(1)),
                shutdown_rx.clone(),
            );
            (memory, Some(task))
        }
        None => {
            tracing::warn!("No snapshot path configured, job state will not survive a restart");
            (MemoryJobStore::new(), None)
        }
    };
    let store: Arc<dyn JobStore> = Arc::new(memory);

    // ── Step 2: Record processors ────────────────────────────────
    let mut registry = ProcessorRegistry::new();
    for processor in PayloadProcessor::defaults() {
        registry.register(Arc::new(processor))?;
    }

    // ── Step 3: Engine ───────────────────────────────────────────
    let engine = Engine::new(store, registry, config.engine.clone())?;
    let engine_handle = engine.start(shutdown_rx.clone());

    // ── Step 4: HTTP server ──────────────────────────────────────
    let jobs = Arc::new(JobService::new(&engine));
    let state = AppState::new(Arc::new(config.clone()), jobs);
    let app = build_app(state, &config.server.cors);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!("JobHub server listening on {}", addr);

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    shutdown_signal().await;
    tracing::info!("Shutdown requested, draining in-flight records");
    let _ = shutdown_tx.send(true);

    // Open progress streams keep connections alive; stop waiting after the grace period.
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!("HTTP server error: {}", e),
        Ok(Err(e)) => tracing::error!("HTTP server task failed: {}", e),
        Err(_) => tracing::warn!("HTTP connections still open after {:?}, closing", grace),
    }

    engine_handle.join().await;
    if let Some(task) = snapshot_task {
        if let Err(e) = task.await {
            tracing::error!("Snapshot task failed: {}", e);
        }
    }

    tracing::info!("JobHub server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
}
