//! Event query handlers: paginated list and single lookup.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{EventListResponse, ListEventsParams};
use crate::app_state::AppState;
use crate::domain::EventId;
use crate::error::{ErrorResponse, GatewayError};

/// Header identifying a client for request supersession.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// `GET /events` — Page through the event log, newest first.
///
/// # Errors
///
/// Returns [`GatewayError`] on bad parameters or cursor, supersession, or
/// store failure.
#[utoipa::path(
    get,
    path = "/events",
    tag = "Events",
    summary = "List auction events",
    description = "Returns one page of events ordered by (blockTimestamp, logIndex, id) descending. Pass `nextCursor` with `direction=next` for older rows or `previousCursor` with `direction=prev` for newer rows. Requests sharing an `X-Client-Id` header supersede each other.",
    params(ListEventsParams),
    responses(
        (status = 200, description = "One page of events", body = EventListResponse),
        (status = 400, description = "Invalid parameter or cursor", body = ErrorResponse),
        (status = 409, description = "Superseded by a newer request", body = ErrorResponse),
    )
)]
pub async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<ListEventsParams>, QueryRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Query(params) = params.map_err(|err| GatewayError::InvalidRequest(err.body_text()))?;
    let request = params.into_request()?;

    let client_id = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());

    let page = match client_id {
        Some(client_id) => {
            state
                .pagination
                .list_events_for_client(client_id, request)
                .await?
        }
        None => state.pagination.list_events(request).await?,
    };

    Ok(Json(EventListResponse::from(page)))
}

/// `GET /events/{id}` — Fetch one event.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the id is malformed and
/// [`GatewayError::EventNotFound`] if no event has this id.
#[utoipa::path(
    get,
    path = "/events/{id}",
    tag = "Events",
    summary = "Get an auction event",
    params(("id" = String, Path, description = "Event id (`<txHash>-<logIndex>`)")),
    responses(
        (status = 200, description = "The event with any enrichment applied", body = serde_json::Value),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let id: EventId = id.parse()?;
    let event = state
        .pagination
        .store()
        .get_event(&id)
        .await?
        .ok_or(GatewayError::EventNotFound(id))?;
    Ok(Json(event))
}

/// Event query routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/{id}", get(get_event))
}
