//! In-memory event store.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::RwLock;
use tokio::sync::broadcast::error::RecvError;

use super::{ChangeStream, EventQuery, EventStore, ScanDirection, StoreError};
use crate::domain::{AuctionEvent, ChangeBus, Enrichment, EventId};

/// Event store backed by a map, notifying through a [`ChangeBus`].
///
/// The write lock is held across the row update and the publish, so a
/// listener that receives an id always reads the committed row.
#[derive(Debug)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<EventId, AuctionEvent>>,
    bus: ChangeBus,
}

impl InMemoryEventStore {
    /// Creates an empty store publishing on `bus`.
    #[must_use]
    pub fn new(bus: ChangeBus) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Returns the number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns `true` if no events are stored.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Removes an event, as a chain reorg on the ingestion side would.
    pub async fn remove_event(&self, id: &EventId) -> Option<AuctionEvent> {
        self.events.write().await.remove(id)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn upsert_event(&self, event: AuctionEvent) -> Result<bool, StoreError> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.id) {
            return Ok(false);
        }
        events.insert(event.id.clone(), event);
        Ok(true)
    }

    async fn get_event(&self, id: &EventId) -> Result<Option<AuctionEvent>, StoreError> {
        Ok(self.events.read().await.get(id).cloned())
    }

    async fn update_enrichment(
        &self,
        id: &EventId,
        enrichment: &Enrichment,
    ) -> Result<u64, StoreError> {
        let mut events = self.events.write().await;
        let Some(event) = events.get_mut(id) else {
            return Ok(0);
        };
        event.enrichment.merge(enrichment);
        let receivers = self.bus.publish(id.clone());
        tracing::debug!(event_id = %id, receivers, "enrichment committed");
        Ok(1)
    }

    async fn list_events(&self, query: EventQuery) -> Result<Vec<AuctionEvent>, StoreError> {
        let events = self.events.read().await;
        let mut rows: Vec<&AuctionEvent> = events
            .values()
            .filter(|event| query.filters.matches(event))
            .filter(|event| match (&query.after, query.direction) {
                (None, _) => true,
                (Some(anchor), ScanDirection::Descending) => event.sort_key() < *anchor,
                (Some(anchor), ScanDirection::Ascending) => event.sort_key() > *anchor,
            })
            .collect();

        match query.direction {
            ScanDirection::Descending => rows.sort_by_key(|event| std::cmp::Reverse(event.sort_key())),
            ScanDirection::Ascending => rows.sort_by_key(|event| event.sort_key()),
        }
        Ok(rows.into_iter().take(query.limit).cloned().collect())
    }

    async fn subscribe_changes(&self) -> Result<ChangeStream, StoreError> {
        let receiver = self.bus.subscribe();
        let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(note) => return Some((Ok(note.event_id), receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "change listener lagged, notifications dropped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, WeiAmount};
    use crate::persistence::EventFilters;

    fn bid(tx: &str, ts: i64, log_index: u32) -> AuctionEvent {
        AuctionEvent {
            id: EventId::from_log(tx, log_index),
            noun_id: 42,
            block_number: 13_000_000,
            block_timestamp: ts,
            log_index,
            tx_hash: tx.to_string(),
            kind: EventKind::Bid {
                bidder: "0x1111111111111111111111111111111111111111".to_string(),
                value_wei: WeiAmount::new(1_000_000_000_000_000_000),
                extended: false,
            },
            enrichment: Enrichment::default(),
        }
    }

    fn query(limit: usize, direction: ScanDirection) -> EventQuery {
        EventQuery {
            limit,
            after: None,
            direction,
            filters: EventFilters::default(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_keeps_enrichment() {
        let store = InMemoryEventStore::new(ChangeBus::new(8));
        let event = bid("0xa", 1_000, 0);
        assert!(matches!(store.upsert_event(event.clone()).await, Ok(true)));

        let enrichment = Enrichment {
            value_usd: Some(50.0),
            ..Enrichment::default()
        };
        let _ = store.update_enrichment(&event.id, &enrichment).await;

        assert!(matches!(store.upsert_event(event.clone()).await, Ok(false)));
        let Ok(Some(stored)) = store.get_event(&event.id).await else {
            panic!("event should exist");
        };
        assert_eq!(stored.enrichment.value_usd, Some(50.0));
    }

    #[tokio::test]
    async fn update_twice_with_same_input_is_stable() {
        let store = InMemoryEventStore::new(ChangeBus::new(8));
        let event = bid("0xa", 1_000, 0);
        let _ = store.upsert_event(event.clone()).await;
        let enrichment = Enrichment {
            value_usd: Some(50.0),
            headline: Some("h".to_string()),
            ..Enrichment::default()
        };

        let _ = store.update_enrichment(&event.id, &enrichment).await;
        let first = store.get_event(&event.id).await.ok().flatten();
        let _ = store.update_enrichment(&event.id, &enrichment).await;
        let second = store.get_event(&event.id).await.ok().flatten();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn update_of_missing_row_affects_nothing_and_is_silent() {
        let bus = ChangeBus::new(8);
        let mut rx = bus.subscribe();
        let store = InMemoryEventStore::new(bus);
        let rows = store
            .update_enrichment(&EventId::new("0xnope-0"), &Enrichment::default())
            .await;
        assert!(matches!(rows, Ok(0)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_notifies_subscribers() {
        let store = InMemoryEventStore::new(ChangeBus::new(8));
        let event = bid("0xa", 1_000, 0);
        let _ = store.upsert_event(event.clone()).await;
        let Ok(mut changes) = store.subscribe_changes().await else {
            panic!("subscribe failed");
        };

        let _ = store.update_enrichment(&event.id, &Enrichment::default()).await;

        let Some(Ok(id)) = changes.next().await else {
            panic!("expected a change");
        };
        assert_eq!(id, event.id);
    }

    #[tokio::test]
    async fn list_orders_and_anchors() {
        let store = InMemoryEventStore::new(ChangeBus::new(8));
        for event in [bid("0xa", 900, 0), bid("0xb", 1_000, 0), bid("0xb", 1_000, 1)] {
            let _ = store.upsert_event(event).await;
        }

        let Ok(desc) = store.list_events(query(10, ScanDirection::Descending)).await else {
            panic!("list failed");
        };
        let ids: Vec<&str> = desc.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["0xb-1", "0xb-0", "0xa-0"]);

        let mut anchored = query(10, ScanDirection::Ascending);
        anchored.after = desc.first().map(AuctionEvent::sort_key);
        let Ok(asc) = store.list_events(anchored).await else {
            panic!("list failed");
        };
        assert!(asc.is_empty());

        let mut limited = query(1, ScanDirection::Descending);
        limited.after = desc.first().map(AuctionEvent::sort_key);
        let Ok(page) = store.list_events(limited).await else {
            panic!("list failed");
        };
        assert_eq!(page.len(), 1);
        assert_eq!(page.first().map(|e| e.id.as_str()), Some("0xb-0"));
    }
}
