//! Opaque pagination cursor.
//!
//! Wire format: URL-safe base64 without padding of the compact JSON
//! `{"t":<blockTimestamp>,"l":<logIndex>,"i":"<id>"}`, i.e. exactly the
//! sort-key tuple of the anchor row.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::domain::{EventId, SortKey};

/// Reason a cursor was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cursor: {0}")]
pub struct CursorError(String);

#[derive(Serialize, Deserialize)]
struct CursorWire {
    t: i64,
    l: u32,
    i: String,
}

/// Position in the `(block_timestamp, log_index, id)` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(SortKey);

impl Cursor {
    /// Wraps a sort key.
    #[must_use]
    pub const fn new(key: SortKey) -> Self {
        Self(key)
    }

    /// Returns the anchor sort key.
    #[must_use]
    pub const fn key(&self) -> &SortKey {
        &self.0
    }

    /// Consumes the cursor, returning the sort key.
    #[must_use]
    pub fn into_key(self) -> SortKey {
        self.0
    }

    /// Encodes the cursor as an opaque token.
    #[must_use]
    pub fn encode(&self) -> String {
        let wire = CursorWire {
            t: self.0.block_timestamp,
            l: self.0.log_index,
            i: self.0.id.as_str().to_string(),
        };
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decodes a token produced by [`Cursor::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if the token is not valid base64, not the
    /// expected JSON, carries a malformed id, or a log index beyond what the
    /// store's signed 32-bit column can hold.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|err| CursorError(err.to_string()))?;
        let wire: CursorWire =
            serde_json::from_slice(&bytes).map_err(|err| CursorError(err.to_string()))?;
        if i32::try_from(wire.l).is_err() {
            return Err(CursorError(format!("log index {} out of range", wire.l)));
        }
        let id = wire
            .i
            .parse::<EventId>()
            .map_err(|err| CursorError(err.to_string()))?;
        Ok(Self(SortKey {
            block_timestamp: wire.t,
            log_index: wire.l,
            id,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn key() -> SortKey {
        SortKey {
            block_timestamp: 1_000,
            log_index: 7,
            id: EventId::new("0xabc-7"),
        }
    }

    #[test]
    fn token_carries_the_sort_key() {
        let token = Cursor::new(key()).encode();
        assert!(!token.contains('='));
        let Ok(decoded) = Cursor::decode(&token) else {
            panic!("token should decode");
        };
        assert_eq!(decoded.into_key(), key());
    }

    #[test]
    fn wire_json_is_compact() {
        let token = Cursor::new(key()).encode();
        let Ok(bytes) = URL_SAFE_NO_PAD.decode(token) else {
            panic!("token should be base64");
        };
        assert_eq!(bytes, br#"{"t":1000,"l":7,"i":"0xabc-7"}"#);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Cursor::decode("!!!").is_err());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode("not json")).is_err());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode(r#"{"t":1,"l":0}"#)).is_err());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode(r#"{"t":1,"l":0,"i":" "}"#)).is_err());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode(r#"{"t":1,"l":-1,"i":"x"}"#)).is_err());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode(r#"{"t":1,"l":0,"i":"x"}"#)).is_err());
    }

    #[test]
    fn log_index_must_fit_the_store_column() {
        let edge = URL_SAFE_NO_PAD.encode(r#"{"t":1,"l":2147483647,"i":"0xabc-7"}"#);
        assert!(Cursor::decode(&edge).is_ok());
        let over = URL_SAFE_NO_PAD.encode(r#"{"t":1,"l":2147483648,"i":"0xabc-7"}"#);
        let Err(err) = Cursor::decode(&over) else {
            panic!("log index above i32::MAX should be rejected");
        };
        assert!(err.to_string().contains("out of range"));
    }
}
