//! Live channel message types.
//!
//! Every frame is a JSON object tagged by `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::AuctionEvent;

/// Server → client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    /// Sent once after the upgrade.
    Welcome {
        /// Greeting text.
        message: &'a str,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// Acknowledges `subscribe`.
    Subscribed,
    /// Acknowledges `unsubscribe`.
    Unsubscribed,
    /// An enriched event.
    Event {
        /// Full event projection.
        data: &'a AuctionEvent,
    },
    /// Keepalive; the client answers with `pong`.
    Ping {
        /// Server time.
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage<'_> {
    /// Serializes the frame.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Client → server frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving `event` frames.
    Subscribe,
    /// Stop receiving `event` frames.
    Unsubscribe,
    /// Answer to `ping`.
    Pong,
}

impl ClientMessage {
    /// Parses a text frame. Anything unrecognised yields `None`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn server_frames_are_tagged() {
        let Ok(json) = ServerMessage::Subscribed.to_json() else {
            panic!("serialization failed");
        };
        assert_eq!(json, r#"{"type":"subscribed"}"#);

        let Ok(json) = (ServerMessage::Ping {
            timestamp: Utc::now(),
        })
        .to_json() else {
            panic!("serialization failed");
        };
        assert!(json.starts_with(r#"{"type":"ping","timestamp":"#));
    }

    #[test]
    fn client_frames_parse() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"subscribe"}"#),
            Some(ClientMessage::Subscribe)
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"pong","extra":1}"#),
            Some(ClientMessage::Pong)
        );
    }

    #[test]
    fn malformed_frames_are_ignored() {
        assert_eq!(ClientMessage::parse("not json"), None);
        assert_eq!(ClientMessage::parse(r#"{"type":"transfer"}"#), None);
        assert_eq!(ClientMessage::parse(r#"{"command":"subscribe"}"#), None);
    }
}
