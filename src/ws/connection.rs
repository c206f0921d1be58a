//! Live channel connection state machine.
//!
//! One task per socket multiplexes three sources:
//! - client frames (`subscribe`, `unsubscribe`, `pong`; everything else is
//!   dropped without a reply),
//! - relay frames while subscribed,
//! - the keepalive timer, which closes the socket after
//!   [`MAX_MISSED_PONGS`] unanswered pings.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::time::MissedTickBehavior;

use super::messages::{ClientMessage, ServerMessage};
use crate::relay::{Frame, NotificationRelay, Subscription};

/// Default keepalive interval (30 seconds).
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Unanswered pings tolerated before the connection is closed.
pub const MAX_MISSED_PONGS: u32 = 2;

const WELCOME: &str = "connected to auction event feed";

/// Waits for the next relay frame, or forever when not subscribed.
async fn recv_relay(subscription: &mut Option<Subscription>) -> Option<Frame> {
    match subscription {
        Some(sub) => sub.receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Runs the read/write loop for a single live connection.
pub async fn run_connection(socket: WebSocket, relay: NotificationRelay, ping_interval: Duration) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subscription: Option<Subscription> = None;
    let mut missed_pongs = 0_u32;

    let welcome = ServerMessage::Welcome {
        message: WELCOME,
        timestamp: chrono::Utc::now(),
    };
    match welcome.to_json() {
        Ok(json) => {
            if ws_tx.send(Message::text(json)).await.is_err() {
                return;
            }
        }
        Err(err) => tracing::error!(error = %err, "failed to encode welcome"),
    }

    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + ping_interval,
        ping_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let reply = match ClientMessage::parse(&text) {
                    Some(ClientMessage::Subscribe) => {
                        if subscription.is_none() {
                            subscription = Some(relay.subscribe());
                        }
                        Some(ServerMessage::Subscribed)
                    }
                    Some(ClientMessage::Unsubscribe) => {
                        if let Some(sub) = subscription.take() {
                            relay.unsubscribe(sub.id);
                        }
                        Some(ServerMessage::Unsubscribed)
                    }
                    Some(ClientMessage::Pong) => {
                        missed_pongs = 0;
                        None
                    }
                    None => {
                        tracing::trace!("dropping malformed client frame");
                        None
                    }
                };
                if let Some(json) = reply.and_then(|r| r.to_json().ok())
                    && ws_tx.send(Message::text(json)).await.is_err()
                {
                    break;
                }
            }
            frame = recv_relay(&mut subscription) => {
                let Some(frame) = frame else {
                    tracing::debug!("relay dropped this subscriber");
                    break;
                };
                if ws_tx.send(Message::text(frame.as_ref())).await.is_err() {
                    break;
                }
            }
            _ = keepalive.tick() => {
                if missed_pongs >= MAX_MISSED_PONGS {
                    tracing::info!(missed_pongs, "closing unresponsive live connection");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                missed_pongs += 1;
                let ping = ServerMessage::Ping { timestamp: chrono::Utc::now() };
                if let Ok(json) = ping.to_json()
                    && ws_tx.send(Message::text(json)).await.is_err()
                {
                    break;
                }
            }
        }
    }

    if let Some(sub) = subscription {
        relay.unsubscribe(sub.id);
    }
    tracing::debug!("live connection closed");
}
