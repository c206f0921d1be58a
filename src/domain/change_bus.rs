//! In-process change-notification channel.
//!
//! [`ChangeBus`] wraps a [`tokio::sync::broadcast`] channel carrying the id
//! of every event whose enrichment was committed. It plays the role of the
//! database notification channel for the in-memory event store; the
//! Postgres store uses `LISTEN`/`NOTIFY` instead.

use tokio::sync::broadcast;

use super::EventId;

/// Payload of a change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Event whose enrichment changed.
    pub event_id: EventId,
}

/// Broadcast bus for [`ChangeNotification`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest notifications are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeNotification>,
}

impl ChangeBus {
    /// Creates a new `ChangeBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a notification to all listeners.
    ///
    /// Returns the number of receivers that got it. With no receivers the
    /// notification is dropped.
    pub fn publish(&self, event_id: EventId) -> usize {
        self.sender
            .send(ChangeNotification { event_id })
            .unwrap_or(0)
    }

    /// Creates a receiver for all future notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = ChangeBus::new(16);
        assert_eq!(bus.publish(EventId::new("0x1-0")), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_notification() {
        let bus = ChangeBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(EventId::new("0x1-0"));

        let Ok(note) = rx.recv().await else {
            panic!("expected to receive notification");
        };
        assert_eq!(note.event_id.as_str(), "0x1-0");
    }

    #[tokio::test]
    async fn notifications_arrive_in_publish_order() {
        let bus = ChangeBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(EventId::new("a"));
        bus.publish(EventId::new("b"));

        let (Ok(first), Ok(second)) = (rx.recv().await, rx.recv().await) else {
            panic!("expected two notifications");
        };
        assert_eq!(first.event_id.as_str(), "a");
        assert_eq!(second.event_id.as_str(), "b");
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = ChangeBus::new(16);
        assert_eq!(bus.receiver_count(), 0);

        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        drop(rx1);
        assert_eq!(bus.receiver_count(), 1);
    }
}
