//! WebSocket layer: the live event channel.
//!
//! The endpoint at `/ws` greets the client, relays enriched events while
//! the client is subscribed and keeps the connection alive with pings.

pub mod connection;
pub mod handler;
pub mod messages;
