//! End-to-end flows over a live server: job submission through enrichment,
//! cursor pagination and the WebSocket feed.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use auction_enricher::api::build_app;
use auction_enricher::app_state::AppState;
use auction_enricher::cache::{CacheCoordinator, InMemoryCacheStore, LockConfig};
use auction_enricher::domain::{
    AuctionEvent, ChangeBus, Clock, Enrichment, EventId, EventKind, SystemClock, WeiAmount,
};
use auction_enricher::pagination::PaginationService;
use auction_enricher::persistence::{EventStore, InMemoryEventStore};
use auction_enricher::queue::{
    EnrichmentWorker, InMemoryJobQueue, JobQueue, RetryPolicy, WorkerConfig,
};
use auction_enricher::relay::{NotificationRelay, SubscriberSet};
use auction_enricher::resolver::{StaticNameResolver, StaticPriceResolver};

const BIDDER: &str = "0x1111111111111111111111111111111111111111";
const WINNER: &str = "0x2222222222222222222222222222222222222222";
const ONE_AND_A_HALF_ETH: u128 = 1_500_000_000_000_000_000;

struct Harness {
    base: String,
    ws_url: String,
    http: reqwest::Client,
    store: Arc<InMemoryEventStore>,
    shutdown: watch::Sender<bool>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl Harness {
    async fn start() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryEventStore::new(ChangeBus::new(64)));
        let events: Arc<dyn EventStore> = Arc::clone(&store) as Arc<dyn EventStore>;

        let coordinator = CacheCoordinator::new(
            Arc::new(InMemoryCacheStore::new(Arc::clone(&clock))),
            Arc::new(StaticNameResolver::new().with_name(BIDDER, "alice.eth")),
            Arc::new(StaticPriceResolver::new(2_000.0)),
            Arc::clone(&clock),
            LockConfig::default(),
        );
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new(
            Arc::clone(&clock),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
            },
        ));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = Arc::new(EnrichmentWorker::new(
            Arc::clone(&queue),
            Arc::clone(&events),
            coordinator,
            Arc::clone(&clock),
            WorkerConfig {
                concurrency: 2,
                write_retry_delay: Duration::from_millis(10),
            },
        ));
        tokio::spawn(worker.run(shutdown_rx.clone()));

        let relay = NotificationRelay::new(Arc::clone(&events), Arc::new(SubscriberSet::new(16)));
        let Ok(changes) = events.subscribe_changes().await else {
            panic!("in-memory change stream should open");
        };
        tokio::spawn(relay.clone().run(changes, shutdown_rx.clone()));

        let state = AppState {
            pagination: Arc::new(PaginationService::new(Arc::clone(&events))),
            queue,
            relay,
            ws_ping_interval: Duration::from_secs(30),
        };
        let app = build_app(state, Duration::from_secs(5));

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("ephemeral port should bind");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("listener should have an address");
        };
        let mut stop = shutdown_rx;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop.changed().await;
                })
                .await;
        });

        Self {
            base: format!("http://{addr}"),
            ws_url: format!("ws://{addr}/ws"),
            http: reqwest::Client::new(),
            store,
            shutdown,
        }
    }

    async fn insert(&self, event: AuctionEvent) {
        let Ok(true) = self.store.upsert_event(event).await else {
            panic!("event should be inserted");
        };
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let Ok(response) = self.http.get(format!("{}{path}", self.base)).send().await else {
            panic!("GET {path} should connect");
        };
        let status = response.status().as_u16();
        let Ok(body) = response.json::<Value>().await else {
            panic!("GET {path} should return json");
        };
        (status, body)
    }

    async fn post(&self, path: &str, body: &Value) -> (u16, Value) {
        let Ok(response) = self
            .http
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await
        else {
            panic!("POST {path} should connect");
        };
        let status = response.status().as_u16();
        let Ok(body) = response.json::<Value>().await else {
            panic!("POST {path} should return json");
        };
        (status, body)
    }

    /// Polls `GET path` until `done` accepts the body.
    async fn wait_for(&self, path: &str, done: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let (_, body) = self.get(path).await;
            if done(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{path} never reached the expected state");
    }
}

fn tx(n: u64) -> String {
    format!("0x{n:064x}")
}

fn bid_event(n: u64, noun_id: u64) -> AuctionEvent {
    AuctionEvent {
        id: EventId::from_log(&tx(n), 0),
        noun_id,
        block_number: 13_000_000 + n,
        block_timestamp: 1_700_000_000 + i64::try_from(n).unwrap_or_default() * 12,
        log_index: 0,
        tx_hash: tx(n),
        kind: EventKind::Bid {
            bidder: BIDDER.to_string(),
            value_wei: WeiAmount::new(ONE_AND_A_HALF_ETH),
            extended: false,
        },
        enrichment: Enrichment::default(),
    }
}

fn created_event(n: u64, noun_id: u64) -> AuctionEvent {
    AuctionEvent {
        kind: EventKind::Created {
            start_time: 1_700_000_000,
            end_time: 1_700_086_400,
        },
        ..bid_event(n, noun_id)
    }
}

fn job_for(event: &AuctionEvent) -> Value {
    let mut job = json!({
        "eventId": event.id.as_str(),
        "nounId": event.noun_id,
        "blockNumber": event.block_number,
        "blockTimestamp": event.block_timestamp,
    });
    let Ok(Value::Object(kind)) = serde_json::to_value(&event.kind) else {
        panic!("kind should serialize to an object");
    };
    if let Value::Object(fields) = &mut job {
        fields.extend(kind);
    }
    job
}

fn ids(page: &Value) -> Vec<String> {
    let Some(data) = page["data"].as_array() else {
        panic!("page should carry a data array");
    };
    data.iter()
        .filter_map(|event| event["id"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn submitted_bid_is_enriched_and_readable() {
    let harness = Harness::start().await;
    let event = bid_event(1, 42);
    harness.insert(event.clone()).await;

    let job = job_for(&event);
    let (status, body) = harness.post("/jobs/enrichment", &job).await;
    assert_eq!(status, 201);
    assert_eq!(body["eventId"], event.id.as_str());
    assert_eq!(body["duplicate"], false);

    let (status, body) = harness.post("/jobs/enrichment", &job).await;
    assert_eq!(status, 200);
    assert_eq!(body["duplicate"], true);

    let path = format!("/events/{}", event.id);
    let enriched = harness
        .wait_for(&path, |body| body["headline"].is_string())
        .await;
    assert_eq!(enriched["resolvedBidderName"], "alice.eth");
    assert_eq!(enriched["valueUsd"], 3000.0);
    assert_eq!(enriched["headline"], "alice.eth bid Ξ1.50 ($3,000.00) on Noun 42");
    assert_eq!(enriched["valueWei"], ONE_AND_A_HALF_ETH.to_string());

    let stats = harness
        .wait_for("/jobs/stats", |body| body["completed"] == 1)
        .await;
    assert_eq!(stats["queued"], 0);
    assert_eq!(stats["failed"], 0);
}

#[tokio::test]
async fn unnamed_winner_is_shortened_in_headline() {
    let harness = Harness::start().await;
    let event = AuctionEvent {
        kind: EventKind::Settled {
            winner: WINNER.to_string(),
            amount_wei: WeiAmount::new(ONE_AND_A_HALF_ETH),
        },
        ..bid_event(4, 5)
    };
    harness.insert(event.clone()).await;

    let (status, _) = harness.post("/jobs/enrichment", &job_for(&event)).await;
    assert_eq!(status, 201);

    let path = format!("/events/{}", event.id);
    let enriched = harness
        .wait_for(&path, |body| body["headline"].is_string())
        .await;
    assert!(enriched["resolvedWinnerName"].is_null());
    assert_eq!(enriched["amountUsd"], 3000.0);
    assert_eq!(
        enriched["headline"],
        "Noun 5 won by 0x2222…2222 for Ξ1.50 ($3,000.00)"
    );
}

#[tokio::test]
async fn job_for_reorged_event_is_skipped() {
    let harness = Harness::start().await;
    let event = bid_event(2, 7);
    harness.insert(event.clone()).await;
    assert!(harness.store.remove_event(&event.id).await.is_some());

    let (status, _) = harness.post("/jobs/enrichment", &job_for(&event)).await;
    assert_eq!(status, 201);

    let stats = harness
        .wait_for("/jobs/stats", |body| body["skipped"] == 1)
        .await;
    assert_eq!(stats["failed"], 0);

    let (status, body) = harness.get(&format!("/events/{}", event.id)).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], 2001);

    let (status, job) = harness.get(&format!("/jobs/{}", event.id)).await;
    assert_eq!(status, 200);
    assert_eq!(job["state"], "skipped");
    assert_eq!(job["attempts"], 1);

    let (status, body) = harness
        .post(&format!("/jobs/{}/retry", event.id), &json!({}))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], 2003);
}

#[tokio::test]
async fn malformed_job_is_rejected_at_the_boundary() {
    let harness = Harness::start().await;
    let mut job = job_for(&bid_event(3, 1));
    job["eventId"] = json!("");

    let (status, body) = harness.post("/jobs/enrichment", &job).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], 1001);

    let (_, stats) = harness.get("/jobs/stats").await;
    assert_eq!(stats["queued"], 0);
}

#[tokio::test]
async fn cursor_pages_walk_the_log_both_ways() {
    let harness = Harness::start().await;
    for n in 1..=5 {
        harness.insert(created_event(n, n)).await;
    }
    harness.insert(bid_event(6, 6)).await;
    let newest_first: Vec<String> = (1..=5)
        .rev()
        .map(|n| EventId::from_log(&tx(n), 0).to_string())
        .collect();

    let (status, first) = harness.get("/events?type=created&limit=2").await;
    assert_eq!(status, 200);
    assert_eq!(ids(&first), newest_first[..2].to_vec());
    assert_eq!(first["pagination"]["hasMore"], true);
    assert!(first["pagination"]["previousCursor"].is_null());

    let Some(next) = first["pagination"]["nextCursor"].as_str() else {
        panic!("first page should link onward");
    };
    let (_, second) = harness
        .get(&format!("/events?type=created&limit=2&cursor={next}"))
        .await;
    assert_eq!(ids(&second), newest_first[2..4].to_vec());

    let Some(next) = second["pagination"]["nextCursor"].as_str() else {
        panic!("second page should link onward");
    };
    let (_, third) = harness
        .get(&format!("/events?type=created&limit=2&cursor={next}"))
        .await;
    assert_eq!(ids(&third), newest_first[4..].to_vec());
    assert_eq!(third["pagination"]["hasMore"], false);

    let Some(prev) = second["pagination"]["previousCursor"].as_str() else {
        panic!("second page should link back");
    };
    let (_, back) = harness
        .get(&format!("/events?type=created&limit=2&direction=prev&cursor={prev}"))
        .await;
    assert_eq!(ids(&back), ids(&first));

    let (_, bids) = harness.get("/events?type=bid").await;
    assert_eq!(ids(&bids), vec![EventId::from_log(&tx(6), 0).to_string()]);
}

#[tokio::test]
async fn subscriber_receives_the_enriched_event() {
    let harness = Harness::start().await;
    let Ok((mut socket, _)) = tokio_tungstenite::connect_async(harness.ws_url.as_str()).await
    else {
        panic!("websocket should connect");
    };

    let welcome = next_json(&mut socket).await;
    assert_eq!(welcome["type"], "welcome");

    let Ok(()) = socket
        .send(Message::text(r#"{"type":"subscribe"}"#))
        .await
    else {
        panic!("subscribe should send");
    };
    let Ok(()) = socket.send(Message::text("not json")).await else {
        panic!("garbage frame should send");
    };
    assert_eq!(next_json(&mut socket).await["type"], "subscribed");

    let event = bid_event(9, 99);
    harness.insert(event.clone()).await;
    let (status, _) = harness.post("/jobs/enrichment", &job_for(&event)).await;
    assert_eq!(status, 201);

    let pushed = next_json(&mut socket).await;
    assert_eq!(pushed["type"], "event");
    assert_eq!(pushed["data"]["id"], event.id.as_str());
    assert_eq!(pushed["data"]["valueUsd"], 3000.0);
    assert!(pushed["data"]["headline"].is_string());

    let (_, health) = harness.get("/health").await;
    assert_eq!(health["liveSubscribers"], 1);
}

async fn next_json<S>(socket: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let Ok(Some(Ok(message))) =
            tokio::time::timeout(Duration::from_secs(5), socket.next()).await
        else {
            panic!("expected a websocket frame");
        };
        if let Message::Text(text) = message {
            let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                panic!("server frames should be json");
            };
            return value;
        }
    }
}
