//! # auction-enricher
//!
//! Enrichment pipeline, cursor-paginated history and live feed for
//! on-chain auction events.
//!
//! Upstream ingestion inserts raw `created`/`bid`/`settled` events and
//! submits one enrichment job per event. Workers resolve the bidder or
//! winner name and the historical ETH/USD price through a shared cache
//! that lets exactly one process fetch each fact, write the result back,
//! and the store's change notification is fanned out to WebSocket
//! subscribers.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)          ├── WS transport (ws/)
//!     │                                 │
//!     ├── PaginationService (pagination/)   NotificationRelay (relay/)
//!     ├── JobQueue ──► EnrichmentWorker (queue/)        ▲
//!     │                   │                             │
//!     │                   ├── CacheCoordinator (cache/) │
//!     │                   │     ├── LockManager         │
//!     │                   │     └── Name/Price resolvers (resolver/)
//!     │                   │                             │
//!     └── EventStore (persistence/) ── change stream ───┘
//!           PostgreSQL (LISTEN/NOTIFY) or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod pagination;
pub mod persistence;
pub mod queue;
pub mod relay;
pub mod resolver;
pub mod ws;
