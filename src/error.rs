//! Service error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the boundary error type. Each variant maps to a
//! specific HTTP status code and structured JSON error response. Layer
//! errors convert into it with `From`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{EventId, EventIdError};
use crate::pagination::PaginationError;
use crate::persistence::StoreError;
use crate::queue::QueueError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1002,
///     "message": "invalid cursor: Invalid symbol 33, offset 0.",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category           | HTTP Status                  |
/// |-----------|--------------------|------------------------------|
/// | 1000–1999 | Validation         | 400 Bad Request              |
/// | 2000–2999 | Not Found/Conflict | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server             | 500 Internal Server Error    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Pagination cursor could not be decoded.
    #[error("{0}")]
    InvalidCursor(String),

    /// Event with the given id was not found.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// No job matches.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The target is in a state that forbids the operation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A newer request from the same client replaced this one.
    #[error("request superseded")]
    Superseded,

    /// Event store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Job queue failure.
    #[error("queue error: {0}")]
    Queue(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidCursor(_) => 1002,
            Self::EventNotFound(_) => 2001,
            Self::JobNotFound(_) => 2002,
            Self::Conflict(_) => 2003,
            Self::Superseded => 2004,
            Self::Internal(_) => 3000,
            Self::Store(_) => 3001,
            Self::Queue(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            Self::EventNotFound(_) | Self::JobNotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::Superseded => StatusCode::CONFLICT,
            Self::Store(_) | Self::Queue(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "event store failure");
        Self::Store(err.to_string())
    }
}

impl From<EventIdError> for GatewayError {
    fn from(err: EventIdError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<PaginationError> for GatewayError {
    fn from(err: PaginationError) -> Self {
        match err {
            PaginationError::InvalidCursor(err) => Self::InvalidCursor(err.to_string()),
            PaginationError::Superseded => Self::Superseded,
            PaginationError::Store(err) => err.into(),
        }
    }
}

impl From<QueueError> for GatewayError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::InvalidJob(reason) => Self::InvalidRequest(reason),
            QueueError::JobNotFound(job_id) => Self::JobNotFound(job_id.to_string()),
            QueueError::EventNotFound(event_id) => {
                Self::JobNotFound(format!("no job for event {event_id}"))
            }
            err @ QueueError::InvalidState { .. } => Self::Conflict(err.to_string()),
            err @ QueueError::Poisoned => Self::Queue(err.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
