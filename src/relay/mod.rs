//! Notification relay: live fan-out of enriched events.
//!
//! The relay owns its [`SubscriberSet`]; nothing global. Several relays
//! can coexist, each with its own members.

pub mod fanout;
pub mod subscribers;

pub use fanout::{NotificationRelay, RelayError};
pub use subscribers::{BroadcastReport, Frame, SubscriberId, SubscriberSet, Subscription};
