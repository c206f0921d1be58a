//! Enrichment job handlers: submission and operator inspection.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{JobDto, QueueStatsResponse, SubmitJobResponse};
use crate::app_state::AppState;
use crate::domain::EventId;
use crate::error::{ErrorResponse, GatewayError};
use crate::queue::{EnrichmentJob, SubmitOutcome};

/// `POST /jobs/enrichment` — Submit an enrichment job.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the body is malformed or
/// missing identity fields.
#[utoipa::path(
    post,
    path = "/jobs/enrichment",
    tag = "Jobs",
    summary = "Submit an enrichment job",
    description = "Queues enrichment for one event. Submissions are keyed by `eventId`: a second submission for the same event returns the existing job with status 200 and queues nothing.",
    request_body(content = serde_json::Value, description = "Event data: eventId, nounId, blockNumber, blockTimestamp, type and the type's fields"),
    responses(
        (status = 201, description = "Job queued", body = SubmitJobResponse),
        (status = 200, description = "Duplicate submission", body = SubmitJobResponse),
        (status = 400, description = "Malformed job", body = ErrorResponse),
    )
)]
pub async fn submit_enrichment_job(
    State(state): State<AppState>,
    body: Result<Json<EnrichmentJob>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Json(job) = body.map_err(|err| GatewayError::InvalidRequest(err.body_text()))?;

    let outcome = state.queue.submit(job).await?;
    let (status, record) = match &outcome {
        SubmitOutcome::Queued(record) => (StatusCode::CREATED, record),
        SubmitOutcome::Duplicate(record) => {
            tracing::debug!(event_id = %record.job.event_id, "duplicate enrichment submission");
            (StatusCode::OK, record)
        }
    };

    Ok((
        status,
        Json(SubmitJobResponse::new(record, outcome.is_duplicate())),
    ))
}

/// `GET /jobs/failed` — List permanently failed jobs.
///
/// # Errors
///
/// Returns [`GatewayError::Queue`] on queue failure.
#[utoipa::path(
    get,
    path = "/jobs/failed",
    tag = "Jobs",
    summary = "List failed jobs",
    responses(
        (status = 200, description = "Failed jobs, oldest first", body = Vec<JobDto>),
    )
)]
pub async fn list_failed_jobs(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let jobs: Vec<JobDto> = state
        .queue
        .failed_jobs()
        .await?
        .into_iter()
        .map(JobDto::from)
        .collect();
    Ok(Json(jobs))
}

/// `GET /jobs/{eventId}` — Look up the job for an event.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the id is malformed and
/// [`GatewayError::JobNotFound`] if no job exists for the event.
#[utoipa::path(
    get,
    path = "/jobs/{eventId}",
    tag = "Jobs",
    summary = "Get the job for an event",
    params(("eventId" = String, Path, description = "Event id the job enriches")),
    responses(
        (status = 200, description = "The job", body = JobDto),
        (status = 400, description = "Malformed event id", body = ErrorResponse),
        (status = 404, description = "No job for this event", body = ErrorResponse),
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let event_id: EventId = event_id.parse()?;
    let record = state
        .queue
        .get_by_event(&event_id)
        .await?
        .ok_or_else(|| GatewayError::JobNotFound(format!("no job for event {event_id}")))?;
    Ok(Json(JobDto::from(record)))
}

/// `POST /jobs/{eventId}/retry` — Requeue a failed job.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the id is malformed,
/// [`GatewayError::JobNotFound`] if no job exists for the event and
/// [`GatewayError::Conflict`] if it has not failed.
#[utoipa::path(
    post,
    path = "/jobs/{eventId}/retry",
    tag = "Jobs",
    summary = "Retry a failed job",
    params(("eventId" = String, Path, description = "Event id of the failed job")),
    responses(
        (status = 200, description = "Job requeued", body = JobDto),
        (status = 400, description = "Malformed event id", body = ErrorResponse),
        (status = 404, description = "No job for this event", body = ErrorResponse),
        (status = 409, description = "Job is not failed", body = ErrorResponse),
    )
)]
pub async fn retry_failed_job(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let event_id: EventId = event_id.parse()?;
    let record = state.queue.retry_failed(&event_id).await?;
    Ok(Json(JobDto::from(record)))
}

/// `GET /jobs/stats` — Job counts by state.
///
/// # Errors
///
/// Returns [`GatewayError::Queue`] on queue failure.
#[utoipa::path(
    get,
    path = "/jobs/stats",
    tag = "Jobs",
    summary = "Queue statistics",
    responses(
        (status = 200, description = "Counts by state", body = QueueStatsResponse),
    )
)]
pub async fn queue_stats(State(state): State<AppState>) -> Result<impl IntoResponse, GatewayError> {
    let stats = state.queue.stats().await?;
    Ok(Json(QueueStatsResponse::from(stats)))
}

/// Job routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/enrichment", post(submit_enrichment_job))
        .route("/jobs/failed", get(list_failed_jobs))
        .route("/jobs/stats", get(queue_stats))
        .route("/jobs/{event_id}", get(get_job))
        .route("/jobs/{event_id}/retry", post(retry_failed_job))
}
