//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::pagination::PaginationService;
use crate::queue::JobQueue;
use crate::relay::NotificationRelay;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Event history queries; also owns the event store handle.
    pub pagination: Arc<PaginationService>,
    /// Enrichment job queue.
    pub queue: Arc<dyn JobQueue>,
    /// Live subscriber registry and fan-out.
    pub relay: NotificationRelay,
    /// Keepalive interval for `/ws` connections.
    pub ws_ping_interval: Duration,
}
