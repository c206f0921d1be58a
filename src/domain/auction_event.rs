//! Auction event record: immutable identity, tagged payload, enrichment.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::EventId;

/// Number of wei in one ether.
const WEI_PER_ETH: f64 = 1e18;

/// An amount of wei.
///
/// Serialized as a decimal JSON string so `u128` values survive clients
/// that parse numbers as doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WeiAmount(u128);

impl WeiAmount {
    /// Wraps a raw wei value.
    #[must_use]
    pub const fn new(wei: u128) -> Self {
        Self(wei)
    }

    /// Returns the raw wei value.
    #[must_use]
    pub const fn get(self) -> u128 {
        self.0
    }

    /// Converts to ether as a float (display and fiat math only).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_eth(self) -> f64 {
        self.0 as f64 / WEI_PER_ETH
    }
}

impl fmt::Display for WeiAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WeiAmount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl Serialize for WeiAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WeiAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Event type discriminator used by filters and the `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// A new auction opened.
    Created,
    /// A bid was placed.
    Bid,
    /// The auction was settled.
    Settled,
}

impl EventType {
    /// Returns the wire/storage spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Bid => "bid",
            Self::Settled => "settled",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "bid" => Ok(Self::Bid),
            "settled" => Ok(Self::Settled),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Type-specific payload. The tag decides which fields exist, so a
/// `created` event cannot carry a winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum EventKind {
    /// Auction opened.
    Created {
        /// Auction start, unix seconds.
        start_time: i64,
        /// Scheduled end, unix seconds.
        end_time: i64,
    },
    /// Bid placed.
    Bid {
        /// Bidder address.
        bidder: String,
        /// Bid value.
        value_wei: WeiAmount,
        /// Whether the bid extended the auction end.
        extended: bool,
    },
    /// Auction settled.
    Settled {
        /// Winner address.
        winner: String,
        /// Winning amount.
        amount_wei: WeiAmount,
    },
}

impl EventKind {
    /// Returns the discriminator for this payload.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Created { .. } => EventType::Created,
            Self::Bid { .. } => EventType::Bid,
            Self::Settled { .. } => EventType::Settled,
        }
    }
}

/// Off-chain context attached by the enrichment worker.
///
/// Every field starts unset. Store writes merge with COALESCE semantics,
/// so a field that has been set is never cleared again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    /// Reverse-resolved bidder name.
    pub resolved_bidder_name: Option<String>,
    /// Reverse-resolved winner name.
    pub resolved_winner_name: Option<String>,
    /// Bid value in USD.
    pub value_usd: Option<f64>,
    /// Settlement amount in USD.
    pub amount_usd: Option<f64>,
    /// Human-readable summary.
    pub headline: Option<String>,
    /// When enrichment last ran.
    pub processed_at: Option<DateTime<Utc>>,
}

impl Enrichment {
    /// Merges `update` into `self`.
    ///
    /// Names, fiat values and `processed_at` only move from unset to set.
    /// The headline is regenerated on every enrichment and therefore
    /// replaced whenever the update carries one.
    pub fn merge(&mut self, update: &Self) {
        if self.resolved_bidder_name.is_none() {
            self.resolved_bidder_name.clone_from(&update.resolved_bidder_name);
        }
        if self.resolved_winner_name.is_none() {
            self.resolved_winner_name.clone_from(&update.resolved_winner_name);
        }
        self.value_usd = self.value_usd.or(update.value_usd);
        self.amount_usd = self.amount_usd.or(update.amount_usd);
        if update.headline.is_some() {
            self.headline.clone_from(&update.headline);
        }
        self.processed_at = self.processed_at.or(update.processed_at);
    }
}

/// The total order used by pagination: `(block_timestamp, log_index, id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    /// Primary key: block timestamp, unix seconds.
    pub block_timestamp: i64,
    /// Tie-break within a block.
    pub log_index: u32,
    /// Final tie-break; makes the order total.
    pub id: EventId,
}

/// An auction event row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionEvent {
    /// Globally unique identifier.
    pub id: EventId,
    /// Noun token being auctioned.
    pub noun_id: u64,
    /// Block that emitted the log.
    pub block_number: u64,
    /// Block timestamp, unix seconds.
    pub block_timestamp: i64,
    /// Position of the log within the block.
    pub log_index: u32,
    /// Transaction hash.
    pub tx_hash: String,
    /// Tagged payload (`type` plus its fields).
    #[serde(flatten)]
    pub kind: EventKind,
    /// Enrichment fields.
    #[serde(flatten)]
    pub enrichment: Enrichment,
}

impl AuctionEvent {
    /// Returns the event's position in the pagination order.
    #[must_use]
    pub fn sort_key(&self) -> SortKey {
        SortKey {
            block_timestamp: self.block_timestamp,
            log_index: self.log_index,
            id: self.id.clone(),
        }
    }

    /// Returns the event type discriminator.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Returns the block time as a UTC instant.
    #[must_use]
    pub fn observed_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.block_timestamp, 0).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn bid_event() -> AuctionEvent {
        AuctionEvent {
            id: EventId::new("0xabc-0"),
            noun_id: 42,
            block_number: 13_000_000,
            block_timestamp: 1_000,
            log_index: 0,
            tx_hash: "0xabc".to_string(),
            kind: EventKind::Bid {
                bidder: "0x1111111111111111111111111111111111111111".to_string(),
                value_wei: WeiAmount::new(1_500_000_000_000_000_000),
                extended: false,
            },
            enrichment: Enrichment::default(),
        }
    }

    #[test]
    fn serializes_flat_with_type_tag() {
        let Ok(json) = serde_json::to_value(bid_event()) else {
            panic!("serialization failed");
        };
        assert_eq!(json["type"], "bid");
        assert_eq!(json["nounId"], 42);
        assert_eq!(json["valueWei"], "1500000000000000000");
        assert!(json["valueUsd"].is_null());
        assert!(json.get("winner").is_none());
    }

    #[test]
    fn deserializes_back_into_tagged_kind() {
        let original = bid_event();
        let Ok(json) = serde_json::to_string(&original) else {
            panic!("serialization failed");
        };
        let Ok(parsed) = serde_json::from_str::<AuctionEvent>(&json) else {
            panic!("deserialization failed");
        };
        assert_eq!(parsed, original);
    }

    #[test]
    fn wei_to_eth() {
        assert!((WeiAmount::new(2_000_000_000_000_000_000).as_eth() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_only_fills_unset_fields() {
        let mut current = Enrichment {
            value_usd: Some(50.0),
            headline: Some("old".to_string()),
            ..Enrichment::default()
        };
        let update = Enrichment {
            value_usd: Some(99.0),
            resolved_bidder_name: Some("alice.eth".to_string()),
            headline: Some("new".to_string()),
            ..Enrichment::default()
        };
        current.merge(&update);
        assert_eq!(current.value_usd, Some(50.0));
        assert_eq!(current.resolved_bidder_name.as_deref(), Some("alice.eth"));
        assert_eq!(current.headline.as_deref(), Some("new"));
    }

    #[test]
    fn merge_is_idempotent() {
        let update = Enrichment {
            amount_usd: Some(10.0),
            headline: Some("h".to_string()),
            ..Enrichment::default()
        };
        let mut once = Enrichment::default();
        once.merge(&update);
        let mut twice = once.clone();
        twice.merge(&update);
        assert_eq!(once, twice);
    }

    #[test]
    fn sort_key_orders_by_timestamp_then_log_index() {
        let mut a = bid_event();
        let mut b = bid_event();
        b.id = EventId::new("0xabc-1");
        b.log_index = 1;
        assert!(a.sort_key() < b.sort_key());
        a.block_timestamp = 2_000;
        assert!(a.sort_key() > b.sort_key());
    }

    #[test]
    fn event_type_round_trips_through_str() {
        for t in [EventType::Created, EventType::Bid, EventType::Settled] {
            assert_eq!(t.as_str().parse::<EventType>(), Ok(t));
        }
        assert!("transfer".parse::<EventType>().is_err());
    }
}
