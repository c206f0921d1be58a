//! Cursor-paginated reads of the event log.
//!
//! Pages are cut on the total order `(block_timestamp, log_index, id)`, so
//! events sharing a timestamp never straddle a page boundary ambiguously.
//! One extra row is fetched to learn whether another page exists.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures_util::future::{AbortHandle, Abortable};

use super::cursor::{Cursor, CursorError};
use crate::domain::AuctionEvent;
use crate::persistence::{EventFilters, EventQuery, EventStore, ScanDirection, StoreError};

/// Page size when the request names none.
pub const DEFAULT_LIMIT: usize = 20;

/// Largest page size served.
pub const MAX_LIMIT: usize = 100;

/// Which way to page from the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Older events (newest-first from the top).
    #[default]
    Next,
    /// Newer events, back toward the top.
    Prev,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Self::Next),
            "prev" => Ok(Self::Prev),
            other => Err(format!("direction must be 'next' or 'prev', got '{other}'")),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Next => "next",
            Self::Prev => "prev",
        })
    }
}

/// Clamps a requested page size into `[1, MAX_LIMIT]`.
#[must_use]
pub fn clamp_limit(requested: Option<i64>) -> usize {
    match requested {
        None => DEFAULT_LIMIT,
        Some(n) => usize::try_from(n.max(1)).unwrap_or(MAX_LIMIT).min(MAX_LIMIT),
    }
}

/// A page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Requested size; clamped.
    pub limit: Option<i64>,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
    /// Paging direction.
    pub direction: Direction,
    /// Equality filters.
    pub filters: EventFilters,
}

/// Navigation metadata of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    /// More rows exist in the requested direction.
    pub has_more: bool,
    /// Cursor for older rows.
    pub next_cursor: Option<String>,
    /// Cursor for newer rows.
    pub previous_cursor: Option<String>,
}

/// One page of events, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Events, newest first.
    pub data: Vec<AuctionEvent>,
    /// Navigation.
    pub pagination: PageInfo,
}

/// Pagination failure.
#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    /// The cursor was malformed.
    #[error(transparent)]
    InvalidCursor(#[from] CursorError),

    /// A newer request from the same client aborted this one.
    #[error("request superseded by a newer one")]
    Superseded,

    /// The event store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Serves cursor-paginated event reads.
#[derive(Debug)]
pub struct PaginationService {
    store: Arc<dyn EventStore>,
    in_flight: DashMap<String, (u64, AbortHandle)>,
    generation: AtomicU64,
}

impl PaginationService {
    /// Creates a service reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            in_flight: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Reads one page.
    ///
    /// # Errors
    ///
    /// Returns [`PaginationError::InvalidCursor`] for a malformed cursor and
    /// [`PaginationError::Store`] when the store fails.
    pub async fn list_events(&self, request: PageRequest) -> Result<Page, PaginationError> {
        let limit = clamp_limit(request.limit);
        let anchor = request.cursor.as_deref().map(Cursor::decode).transpose()?;
        let has_cursor = anchor.is_some();
        let scan = match request.direction {
            Direction::Next => ScanDirection::Descending,
            Direction::Prev => ScanDirection::Ascending,
        };

        let mut data = self
            .store
            .list_events(EventQuery {
                limit: limit + 1,
                after: anchor.map(Cursor::into_key),
                direction: scan,
                filters: request.filters,
            })
            .await?;

        let has_more = data.len() > limit;
        data.truncate(limit);
        if request.direction == Direction::Prev {
            data.reverse();
        }

        let first = data.first().map(|event| Cursor::new(event.sort_key()).encode());
        let last = data.last().map(|event| Cursor::new(event.sort_key()).encode());
        let (next_cursor, previous_cursor) = match request.direction {
            Direction::Next => (
                last.filter(|_| has_more),
                first.filter(|_| has_cursor),
            ),
            Direction::Prev => (last, first.filter(|_| has_more)),
        };

        Ok(Page {
            data,
            pagination: PageInfo {
                has_more,
                next_cursor,
                previous_cursor,
            },
        })
    }

    /// Reads one page on behalf of `client_id`, aborting that client's
    /// previous request if it is still running.
    ///
    /// # Errors
    ///
    /// As [`PaginationService::list_events`], plus
    /// [`PaginationError::Superseded`] when a newer request from the same
    /// client aborted this one.
    pub async fn list_events_for_client(
        &self,
        client_id: &str,
        request: PageRequest,
    ) -> Result<Page, PaginationError> {
        let (handle, registration) = AbortHandle::new_pair();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        if let Some((_, previous)) = self
            .in_flight
            .insert(client_id.to_string(), (generation, handle))
        {
            previous.abort();
            tracing::debug!(client_id, "superseding in-flight page request");
        }

        let result = Abortable::new(self.list_events(request), registration).await;
        self.in_flight
            .remove_if(client_id, |_, (current, _)| *current == generation);

        result.unwrap_or(Err(PaginationError::Superseded))
    }
}
