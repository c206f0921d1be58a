//! Domain layer: auction events, identifiers, headlines, time and change
//! notifications.
//!
//! Identity fields of an [`AuctionEvent`] are fixed at insert; only the
//! [`Enrichment`] part changes afterwards, and only through the
//! enrichment worker.

pub mod auction_event;
pub mod change_bus;
pub mod clock;
pub mod event_id;
pub mod headline;

pub use auction_event::{AuctionEvent, Enrichment, EventKind, EventType, SortKey, WeiAmount};
pub use change_bus::{ChangeBus, ChangeNotification};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event_id::{EventId, EventIdError};
pub use headline::{build_headline, format_usd, round_cents, shorten_address};
