//! Change notification → live subscriber fan-out.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;

use super::subscribers::{BroadcastReport, Frame, SubscriberId, SubscriberSet, Subscription};
use crate::domain::EventId;
use crate::persistence::{ChangeStream, EventStore, StoreError};
use crate::ws::messages::ServerMessage;

/// Fan-out failure for one notification.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The event could not be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The event frame could not be serialized.
    #[error("failed to encode event frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Pushes enriched events to live subscribers.
///
/// Delivery is at-least-once per live member and follows notification
/// order. A broadcast that fails part-way is not retried; clients
/// reconcile through the paginated history.
#[derive(Debug, Clone)]
pub struct NotificationRelay {
    store: Arc<dyn EventStore>,
    subscribers: Arc<SubscriberSet>,
}

impl NotificationRelay {
    /// Creates a relay reading from `store` and pushing to `subscribers`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, subscribers: Arc<SubscriberSet>) -> Self {
        Self { store, subscribers }
    }

    /// Registers a new live subscriber.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let subscription = self.subscribers.insert();
        tracing::debug!(subscriber = %subscription.id, total = self.subscribers.len(), "subscriber added");
        subscription
    }

    /// Removes a live subscriber.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.remove(id) {
            tracing::debug!(subscriber = %id, total = self.subscribers.len(), "subscriber removed");
        }
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Loads `event_id` and broadcasts it as an `event` frame.
    ///
    /// A missing event broadcasts nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] if the event cannot be loaded or encoded.
    pub async fn publish_event(&self, event_id: &EventId) -> Result<BroadcastReport, RelayError> {
        if self.subscribers.is_empty() {
            return Ok(BroadcastReport::default());
        }
        let Some(event) = self.store.get_event(event_id).await? else {
            tracing::warn!(%event_id, "notified event not found");
            return Ok(BroadcastReport::default());
        };
        let frame: Frame = serde_json::to_string(&ServerMessage::Event { data: &event })?.into();
        let report = self.subscribers.broadcast(&frame);
        tracing::debug!(%event_id, delivered = report.delivered, removed = report.removed, "event relayed");
        Ok(report)
    }

    /// Relays `changes` until the stream ends or `shutdown` turns `true`.
    pub async fn run(self, mut changes: ChangeStream, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("notification relay started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                change = changes.next() => match change {
                    Some(Ok(event_id)) => {
                        if let Err(err) = self.publish_event(&event_id).await {
                            tracing::error!(%event_id, error = %err, "relay failed");
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "change stream error");
                    }
                    None => {
                        tracing::warn!("change stream ended");
                        break;
                    }
                },
            }
        }
        tracing::info!("notification relay stopped");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{AuctionEvent, ChangeBus, Enrichment, EventKind, WeiAmount};
    use crate::persistence::InMemoryEventStore;

    fn settled() -> AuctionEvent {
        AuctionEvent {
            id: EventId::new("0xs-3"),
            noun_id: 9,
            block_number: 13_000_000,
            block_timestamp: 1_000,
            log_index: 3,
            tx_hash: "0xs".to_string(),
            kind: EventKind::Settled {
                winner: "0x2222222222222222222222222222222222222222".to_string(),
                amount_wei: WeiAmount::new(2_000_000_000_000_000_000),
            },
            enrichment: Enrichment::default(),
        }
    }

    fn relay() -> (Arc<InMemoryEventStore>, NotificationRelay) {
        let store = Arc::new(InMemoryEventStore::new(ChangeBus::new(16)));
        let relay = NotificationRelay::new(
            Arc::clone(&store) as Arc<dyn EventStore>,
            Arc::new(SubscriberSet::default()),
        );
        (store, relay)
    }

    #[tokio::test]
    async fn enrichment_reaches_subscriber_exactly_once() {
        let (store, relay) = relay();
        let event = settled();
        let _ = store.upsert_event(event.clone()).await;
        let mut sub = relay.subscribe();

        let Ok(changes) = store.subscribe_changes().await else {
            panic!("subscribe failed");
        };
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(relay.clone().run(changes, rx));

        let enrichment = Enrichment {
            amount_usd: Some(4_000.0),
            ..Enrichment::default()
        };
        let _ = store.update_enrichment(&event.id, &enrichment).await;

        let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(2), sub.receiver.recv()).await
        else {
            panic!("expected an event frame");
        };
        let Ok(json) = serde_json::from_str::<serde_json::Value>(&frame) else {
            panic!("frame should be JSON");
        };
        assert_eq!(json["type"], "event");
        assert_eq!(json["data"]["id"], "0xs-3");
        assert_eq!(json["data"]["amountUsd"], 4_000.0);

        let _ = tx.send(true);
        assert!(task.await.is_ok());
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn departed_subscriber_is_dropped_on_broadcast() {
        let (store, relay) = relay();
        let event = settled();
        let _ = store.upsert_event(event.clone()).await;
        let _kept = relay.subscribe();
        let gone = relay.subscribe();
        drop(gone);

        let Ok(report) = relay.publish_event(&event.id).await else {
            panic!("publish failed");
        };
        assert_eq!(report.delivered, 1);
        assert_eq!(relay.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn unknown_event_broadcasts_nothing() {
        let (_store, relay) = relay();
        let mut sub = relay.subscribe();
        let Ok(report) = relay.publish_event(&EventId::new("0xnone-0")).await else {
            panic!("publish failed");
        };
        assert_eq!(report, BroadcastReport::default());
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn run_stops_when_changes_end() {
        let (_store, relay) = relay();
        let (_tx, rx) = watch::channel(false);
        let empty: ChangeStream = futures_util::stream::empty().boxed();
        let finished = tokio::time::timeout(Duration::from_secs(1), relay.run(empty, rx)).await;
        assert!(finished.is_ok());
    }
}
