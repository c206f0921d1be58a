//! Cache coordination: store client, distributed lock, TTL tiers, and the
//! stampede-avoiding [`CacheCoordinator`].

pub mod coordinator;
pub mod lock;
pub mod policy;
pub mod store;

pub use coordinator::{CacheCoordinator, ENS_DEPLOYMENT_BLOCK, hour_bucket, name_key, price_key};
pub use lock::{LockConfig, LockGuard, LockManager};
pub use policy::TtlPolicy;
pub use store::{CacheStore, InMemoryCacheStore, RedisCacheStore};

/// Cache store failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The backing store rejected or failed the command.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A cached value could not be decoded.
    #[error("corrupt cache entry {key}: {reason}")]
    Corrupt {
        /// Offending key.
        key: String,
        /// Decode failure.
        reason: String,
    },
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}
