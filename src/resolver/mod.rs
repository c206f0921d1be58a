//! External resolvers: off-chain facts fetched on cache miss.
//!
//! Resolvers return explicit `Result`s. A transient failure is an
//! [`ResolveError`] the enrichment worker can decide to retry; a definitive
//! "nothing there" is `Ok(None)`.

pub mod fixed;
pub mod http;

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cache::CacheError;

pub use fixed::{StaticNameResolver, StaticPriceResolver};
pub use http::{HttpNameResolver, HttpPriceResolver};

/// Failure to obtain an external fact.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    /// The request exceeded its deadline.
    #[error("resolver timed out")]
    Timeout,

    /// Transport-level failure.
    #[error("resolver request failed: {0}")]
    Request(String),

    /// The upstream answered with a non-success status.
    #[error("resolver returned status {0}")]
    Status(u16),

    /// The upstream answered with an unexpected body.
    #[error("malformed resolver response: {0}")]
    Malformed(String),

    /// The cache in front of the resolver failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Reverse name resolution (address → primary name).
#[async_trait]
pub trait NameResolver: Send + Sync + Debug {
    /// Returns the primary name for `address`, or `None` if it has none.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] on timeout or upstream failure.
    async fn resolve_name(&self, address: &str) -> Result<Option<String>, ResolveError>;
}

/// Historical ETH/USD price lookup.
#[async_trait]
pub trait PriceResolver: Send + Sync + Debug {
    /// Returns the ETH/USD price for the hour starting at `hour_start`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] on timeout, upstream failure or a missing price.
    async fn eth_usd_at(&self, hour_start: DateTime<Utc>) -> Result<f64, ResolveError>;
}
