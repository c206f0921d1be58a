//! Event query DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::PaginationDto;
use crate::domain::{AuctionEvent, EventType};
use crate::error::GatewayError;
use crate::pagination::{Direction, Page, PageRequest};
use crate::persistence::EventFilters;

/// Query parameters of `GET /events`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListEventsParams {
    /// Page size, clamped to 1..=100. Defaults to 20.
    pub limit: Option<i64>,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
    /// `next` (older, default) or `prev` (newer).
    pub direction: Option<String>,
    /// Only events of this type: `created`, `bid` or `settled`.
    #[serde(rename = "type")]
    #[param(rename = "type")]
    pub event_type: Option<String>,
    /// Only events for this noun. At most `i64::MAX`.
    pub noun_id: Option<u64>,
}

impl ListEventsParams {
    /// Validates the parameters into a page request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for an unknown direction or
    /// event type, or a noun id the store cannot represent.
    pub fn into_request(self) -> Result<PageRequest, GatewayError> {
        let direction = self
            .direction
            .as_deref()
            .map(str::parse::<Direction>)
            .transpose()
            .map_err(GatewayError::InvalidRequest)?
            .unwrap_or_default();
        let event_type = self
            .event_type
            .as_deref()
            .map(str::parse::<EventType>)
            .transpose()
            .map_err(GatewayError::InvalidRequest)?;
        if let Some(noun_id) = self.noun_id.filter(|n| i64::try_from(*n).is_err()) {
            return Err(GatewayError::InvalidRequest(format!(
                "nounId {noun_id} out of range"
            )));
        }

        Ok(PageRequest {
            limit: self.limit,
            cursor: self.cursor.filter(|c| !c.is_empty()),
            direction,
            filters: EventFilters {
                event_type,
                noun_id: self.noun_id,
            },
        })
    }
}

/// Response body of `GET /events`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventListResponse {
    /// Events, newest first.
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<AuctionEvent>,
    /// Cursor navigation.
    pub pagination: PaginationDto,
}

impl From<Page> for EventListResponse {
    fn from(page: Page) -> Self {
        Self {
            data: page.data,
            pagination: page.pagination.into(),
        }
    }
}
