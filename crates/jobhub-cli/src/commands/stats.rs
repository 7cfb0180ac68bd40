//! Queue statistics command.

use jobhub_core::error::AppError;
use serde_json::Value;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

/// `stats`
pub async fn execute(client: &ApiClient, format: OutputFormat) -> Result<(), AppError> {
    let stats: Value = client.get("/stats").await?;
    match format {
        OutputFormat::Json => output::print_json(&stats),
        OutputFormat::Table => {
            println!("Queue Status:");
            for key in [
                "total_jobs",
                "queued",
                "running",
                "paused",
                "completed",
                "failed",
                "cancelled",
                "records_total",
                "records_processed",
                "records_succeeded",
                "records_failed",
                "pool_size",
            ] {
                let value = stats.get(key).map(Value::to_string).unwrap_or_default();
                output::print_kv(key, &value);
            }
        }
    }
    Ok(())
}
