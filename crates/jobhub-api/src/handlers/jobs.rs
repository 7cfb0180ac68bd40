//! Job submission, control and observation handlers.

use std::convert::Infallible;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tracing::warn;
use validator::Validate;

use jobhub_entity::record::RecordOutcome;
use jobhub_service::JobStats;

use crate::dto::request::{ListJobsQuery, OutcomesQuery, SubmitJobRequest};
use crate::dto::response::{ApiResponse, JobResponse, SubmitJobResponse};
use crate::error::ApiError;
use crate::extractors::parse_job_id;
use crate::state::AppState;

/// POST /api/jobs
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<SubmitJobResponse>>), ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let job_id = state.jobs.submit(req.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(SubmitJobResponse { job_id })),
    ))
}

/// GET /api/jobs?status=...
pub async fn list_jobs(
    State(state): State<AppState>,
    query: Result<Query<ListJobsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<JobResponse>>>, ApiError> {
    let Query(query) = query?;
    let jobs = state.jobs.list_jobs(query.status()?).await?;
    Ok(Json(ApiResponse::ok(
        jobs.into_iter().map(JobResponse::from).collect(),
    )))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let job = state.jobs.get_status(parse_job_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(job.into())))
}

/// POST /api/jobs/{id}/pause
pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let job = state.jobs.pause(parse_job_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(job.into())))
}

/// POST /api/jobs/{id}/resume
pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let job = state.jobs.resume(parse_job_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(job.into())))
}

/// POST /api/jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let job = state.jobs.cancel(parse_job_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(job.into())))
}

/// POST /api/jobs/{id}/retry
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let job = state.jobs.retry(parse_job_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(job.into())))
}

/// GET /api/jobs/{id}/outcomes?errors_only=true
pub async fn list_outcomes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<OutcomesQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<RecordOutcome>>>, ApiError> {
    let Query(query) = query?;
    let outcomes = state
        .jobs
        .list_outcomes(parse_job_id(&id)?, query.errors_only)
        .await?;
    Ok(Json(ApiResponse::ok(outcomes)))
}

/// GET /api/jobs/{id}/outcomes/history
pub async fn outcome_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<RecordOutcome>>>, ApiError> {
    let outcomes = state.jobs.outcome_history(parse_job_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(outcomes)))
}

/// GET /api/jobs/{id}/stream
///
/// Server-sent events, one `progress` event per observed snapshot. The
/// stream closes after the job reaches a terminal state.
pub async fn stream_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let snapshots = state.jobs.stream_progress(parse_job_id(&id)?).await?;

    let events = snapshots.filter_map(|job| async move {
        match Event::default()
            .event("progress")
            .json_data(JobResponse::from(job))
        {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                warn!(error = %e, "Failed to encode progress event");
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// GET /api/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<ApiResponse<JobStats>>, ApiError> {
    let stats = state.jobs.stats().await?;
    Ok(Json(ApiResponse::ok(stats)))
}
