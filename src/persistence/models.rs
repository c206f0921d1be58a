//! Row mapping for the `auction_events` table.
//!
//! The table is flat: variant-specific columns are nullable and the
//! `event_type` discriminator decides which of them must be present. The
//! mapping back into [`EventKind`] rejects rows whose columns do not match
//! their type.

use chrono::{DateTime, Utc};

use super::StoreError;
use crate::domain::{AuctionEvent, Enrichment, EventId, EventKind, EventType, WeiAmount};

/// Column list shared by every `SELECT` on `auction_events`.
pub const EVENT_COLUMNS: &str = "id, event_type, noun_id, block_number, block_timestamp, \
     log_index, tx_hash, start_time, end_time, bidder, value_wei, extended, winner, \
     amount_wei, resolved_bidder_name, resolved_winner_name, value_usd, amount_usd, \
     headline, processed_at";

/// A row of the `auction_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Primary key.
    pub id: String,
    /// `created`, `bid` or `settled`.
    pub event_type: String,
    /// Noun token id.
    pub noun_id: i64,
    /// Block number.
    pub block_number: i64,
    /// Block timestamp in unix seconds.
    pub block_timestamp: i64,
    /// Log index within the block.
    pub log_index: i32,
    /// Transaction hash.
    pub tx_hash: String,
    /// `created`: auction start.
    pub start_time: Option<i64>,
    /// `created`: auction end.
    pub end_time: Option<i64>,
    /// `bid`: bidder address.
    pub bidder: Option<String>,
    /// `bid`: value in wei, decimal string.
    pub value_wei: Option<String>,
    /// `bid`: whether the bid extended the auction.
    pub extended: Option<bool>,
    /// `settled`: winner address.
    pub winner: Option<String>,
    /// `settled`: amount in wei, decimal string.
    pub amount_wei: Option<String>,
    /// Enrichment.
    pub resolved_bidder_name: Option<String>,
    /// Enrichment.
    pub resolved_winner_name: Option<String>,
    /// Enrichment.
    pub value_usd: Option<f64>,
    /// Enrichment.
    pub amount_usd: Option<f64>,
    /// Enrichment.
    pub headline: Option<String>,
    /// Enrichment.
    pub processed_at: Option<DateTime<Utc>>,
}

fn corrupt(id: &str, reason: impl Into<String>) -> StoreError {
    StoreError::CorruptRow {
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn required<T>(id: &str, column: &str, value: Option<T>) -> Result<T, StoreError> {
    value.ok_or_else(|| corrupt(id, format!("missing {column}")))
}

fn wei(id: &str, column: &str, value: Option<String>) -> Result<WeiAmount, StoreError> {
    required(id, column, value)?
        .parse()
        .map_err(|err| corrupt(id, format!("{column}: {err}")))
}

impl TryFrom<EventRow> for AuctionEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let id = row.id.as_str();
        let event_type: EventType = row.event_type.parse().map_err(|err: String| corrupt(id, err))?;
        let kind = match event_type {
            EventType::Created => EventKind::Created {
                start_time: required(id, "start_time", row.start_time)?,
                end_time: required(id, "end_time", row.end_time)?,
            },
            EventType::Bid => EventKind::Bid {
                bidder: required(id, "bidder", row.bidder)?,
                value_wei: wei(id, "value_wei", row.value_wei)?,
                extended: row.extended.unwrap_or(false),
            },
            EventType::Settled => EventKind::Settled {
                winner: required(id, "winner", row.winner)?,
                amount_wei: wei(id, "amount_wei", row.amount_wei)?,
            },
        };

        Ok(Self {
            noun_id: u64::try_from(row.noun_id).map_err(|err| corrupt(id, err.to_string()))?,
            block_number: u64::try_from(row.block_number)
                .map_err(|err| corrupt(id, err.to_string()))?,
            block_timestamp: row.block_timestamp,
            log_index: u32::try_from(row.log_index).map_err(|err| corrupt(id, err.to_string()))?,
            tx_hash: row.tx_hash,
            kind,
            enrichment: Enrichment {
                resolved_bidder_name: row.resolved_bidder_name,
                resolved_winner_name: row.resolved_winner_name,
                value_usd: row.value_usd,
                amount_usd: row.amount_usd,
                headline: row.headline,
                processed_at: row.processed_at,
            },
            id: EventId::new(row.id),
        })
    }
}

/// Converts an unsigned value into a signed column value.
///
/// # Errors
///
/// Returns [`StoreError::OutOfRange`] if `value` exceeds the column type.
pub fn to_column<T, U>(field: &'static str, value: T) -> Result<U, StoreError>
where
    T: Copy + ToString,
    U: TryFrom<T>,
{
    U::try_from(value).map_err(|_| StoreError::OutOfRange {
        field,
        value: value.to_string(),
    })
}
