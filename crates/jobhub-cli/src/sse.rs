//! Progress updates decoded from the job's server-sent events stream.

use std::fmt;

use eventsource_stream::{Event, Eventsource};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use jobhub_api::dto::response::JobResponse;
use jobhub_core::error::AppError;

/// Event name carrying a job snapshot.
pub const PROGRESS_EVENT: &str = "progress";

/// Turns a raw response body into job snapshots, one per `progress`
/// event. Characters split across chunk boundaries are reassembled before
/// decoding; malformed or unrelated events are skipped.
pub fn progress_updates<S, B, E>(body: S) -> impl Stream<Item = Result<JobResponse, AppError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    body.eventsource().filter_map(|result| async move {
        match result {
            Ok(event) => decode_progress(&event).map(Ok),
            Err(e) => Some(Err(AppError::service_unavailable(format!(
                "Stream interrupted: {e}"
            )))),
        }
    })
}

fn decode_progress(event: &Event) -> Option<JobResponse> {
    if event.event != PROGRESS_EVENT {
        debug!(event = %event.event, "Ignoring stream event");
        return None;
    }
    match serde_json::from_str(&event.data) {
        Ok(job) => Some(job),
        Err(e) => {
            warn!(error = %e, "Skipping malformed progress event");
            None
        }
    }
}
