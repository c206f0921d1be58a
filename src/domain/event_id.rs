//! Type-safe auction event identifier.
//!
//! [`EventId`] is a newtype around the string `"<txHash>-<logIndex>"`. The
//! transaction hash plus the log position is globally unique on a chain, so
//! the same log observed twice by the listener maps to the same row.
//!
//! Identifiers arriving from outside (request bodies, paths, cursors) go
//! through [`FromStr`], which checks the shape and normalizes the hash to
//! lower case. [`EventId::new`] wraps rows the store already accepted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reason a string is not an event identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventIdError {
    /// Nothing but whitespace.
    #[error("event id is empty")]
    Empty,
    /// Not `<txHash>-<logIndex>`.
    #[error("event id {0:?} is not <txHash>-<logIndex>")]
    Malformed(String),
}

/// Unique identifier for an auction event.
///
/// Immutable after insert. Used as the primary key of the event table, the
/// idempotency key of enrichment jobs, and the payload of change
/// notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EventId(String);

impl EventId {
    /// Wraps an already-formed identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the identifier from a transaction hash and log index.
    ///
    /// The hash is lower-cased so that checksummed and plain hex spellings
    /// of the same transaction collapse onto one identifier.
    #[must_use]
    pub fn from_log(tx_hash: &str, log_index: u32) -> Self {
        Self(format!("{}-{log_index}", tx_hash.to_ascii_lowercase()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventId {
    type Err = EventIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EventIdError::Empty);
        }
        let malformed = || EventIdError::Malformed(s.to_string());
        let (hash, index) = s.rsplit_once('-').ok_or_else(malformed)?;
        if hash.is_empty() || hash.chars().any(char::is_whitespace) {
            return Err(malformed());
        }
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let log_index = index.parse::<u32>().map_err(|_| malformed())?;
        Ok(Self::from_log(hash, log_index))
    }
}

impl TryFrom<String> for EventId {
    type Error = EventIdError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        id.parse()
    }
}

impl From<EventId> for String {
    fn from(id: EventId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn from_log_joins_hash_and_index() {
        let id = EventId::from_log("0xABCdef", 7);
        assert_eq!(id.as_str(), "0xabcdef-7");
    }

    #[test]
    fn same_log_yields_same_id() {
        assert_eq!(
            EventId::from_log("0xAAA", 1),
            EventId::from_log("0xaaa", 1)
        );
        assert_ne!(EventId::from_log("0xaaa", 1), EventId::from_log("0xaaa", 2));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = EventId::new("0x1-0");
        let Ok(json) = serde_json::to_string(&id) else {
            panic!("serialization failed");
        };
        assert_eq!(json, "\"0x1-0\"");
    }

    #[test]
    fn parse_accepts_hash_and_numeric_index() {
        let Ok(id) = "0xABC-07".parse::<EventId>() else {
            panic!("well-formed id should parse");
        };
        assert_eq!(id.as_str(), "0xabc-7");
        assert_eq!(
            " 0x1-0 ".parse::<EventId>(),
            Ok(EventId::from_log("0x1", 0))
        );
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert_eq!("  ".parse::<EventId>(), Err(EventIdError::Empty));
        for bad in [
            "definitely not a tx-hash id",
            "0xabc",
            "-3",
            "0xabc-",
            "0xabc-x1",
            "0xabc-+1",
            "0xabc-99999999999",
        ] {
            assert!(
                matches!(bad.parse::<EventId>(), Err(EventIdError::Malformed(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn deserialization_validates() {
        assert!(serde_json::from_str::<EventId>("\"0x1-2\"").is_ok());
        assert!(serde_json::from_str::<EventId>("\"0x1\"").is_err());
        assert!(serde_json::from_str::<EventId>("\"\"").is_err());
    }

    #[test]
    fn hash_works_in_hashmap() {
        use std::collections::HashMap;
        let id = EventId::new("0x1-0");
        let mut map = HashMap::new();
        map.insert(id.clone(), "test");
        assert_eq!(map.get(&id), Some(&"test"));
    }
}
