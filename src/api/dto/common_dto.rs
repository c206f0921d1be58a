//! Shared DTO types used across multiple endpoints.

use serde::Serialize;
use utoipa::ToSchema;

use crate::pagination::PageInfo;

/// Cursor navigation included in list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginationDto {
    /// More rows exist in the requested direction.
    pub has_more: bool,
    /// Cursor for older rows.
    pub next_cursor: Option<String>,
    /// Cursor for newer rows.
    pub previous_cursor: Option<String>,
}

impl From<PageInfo> for PaginationDto {
    fn from(info: PageInfo) -> Self {
        Self {
            has_more: info.has_more,
            next_cursor: info.next_cursor,
            previous_cursor: info.previous_cursor,
        }
    }
}
