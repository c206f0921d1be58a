//! Persistence layer: the auction event table and its change channel.
//!
//! [`EventStore`] is the contract the rest of the service needs: idempotent
//! insert from the ingestion side, keyed reads, ordered range reads for
//! pagination, a transactional enrichment update that notifies on commit,
//! and a stream of committed changes.
//!
//! Two implementations:
//! - [`PostgresEventStore`] over `sqlx::PgPool` with `LISTEN`/`NOTIFY`.
//! - [`InMemoryEventStore`] for tests and local runs, notifying through a
//!   [`ChangeBus`](crate::domain::ChangeBus).

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt::Debug;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::{AuctionEvent, Enrichment, EventId, EventType, SortKey};

pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;

/// Channel name used for enrichment change notifications.
pub const CHANGE_CHANNEL: &str = "auction_event_enriched";

/// Stream of ids whose enrichment was committed.
pub type ChangeStream = BoxStream<'static, Result<EventId, StoreError>>;

/// Event store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database driver error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to an event.
    #[error("corrupt event row {id}: {reason}")]
    CorruptRow {
        /// Row id.
        id: String,
        /// Mapping failure.
        reason: String,
    },

    /// A value does not fit the storage column type.
    #[error("value out of range for {field}: {value}")]
    OutOfRange {
        /// Column name.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// The change listener failed.
    #[error("change listener error: {0}")]
    Listener(String),
}

/// Sort direction over `(block_timestamp, log_index, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    /// Descending, strictly before the anchor (newest-first).
    #[default]
    Descending,
    /// Ascending, strictly after the anchor.
    Ascending,
}

/// Equality filters applied before ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilters {
    /// Only events of this type.
    pub event_type: Option<EventType>,
    /// Only events for this noun.
    pub noun_id: Option<u64>,
}

impl EventFilters {
    /// Returns `true` if `event` passes every filter.
    #[must_use]
    pub fn matches(&self, event: &AuctionEvent) -> bool {
        self.event_type.is_none_or(|t| t == event.event_type())
            && self.noun_id.is_none_or(|n| n == event.noun_id)
    }
}

/// Ordered range read over the event table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Maximum rows to return.
    pub limit: usize,
    /// Exclusive anchor; `None` starts at the respective end.
    pub after: Option<SortKey>,
    /// Scan direction.
    pub direction: ScanDirection,
    /// Equality filters.
    pub filters: EventFilters,
}

/// Storage contract for auction events.
#[async_trait]
pub trait EventStore: Send + Sync + Debug {
    /// Inserts `event` unless a row with the same id exists.
    ///
    /// Returns `true` if a row was inserted. Existing rows, enrichment
    /// included, are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn upsert_event(&self, event: AuctionEvent) -> Result<bool, StoreError>;

    /// Loads one event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or a corrupt row.
    async fn get_event(&self, id: &EventId) -> Result<Option<AuctionEvent>, StoreError>;

    /// Applies `enrichment` to the row and, if a row changed, notifies
    /// [`CHANGE_CHANNEL`] in the same transaction.
    ///
    /// Set fields keep their first value; the headline is replaced when
    /// `enrichment` carries one. Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure; nothing is committed.
    async fn update_enrichment(
        &self,
        id: &EventId,
        enrichment: &Enrichment,
    ) -> Result<u64, StoreError>;

    /// Reads up to `query.limit` events in `query.direction` order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or a corrupt row.
    async fn list_events(&self, query: EventQuery) -> Result<Vec<AuctionEvent>, StoreError>;

    /// Subscribes to committed enrichment changes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Listener`] if the channel cannot be joined.
    async fn subscribe_changes(&self) -> Result<ChangeStream, StoreError>;
}
