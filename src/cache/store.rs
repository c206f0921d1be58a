//! Key-value cache store client.
//!
//! [`CacheStore`] is the contract this service needs from its cache: plain
//! get/set with per-key expiry, an atomic set-if-absent for locks, and a
//! compare-and-delete so a lock holder only ever releases its own lock.
//!
//! Two implementations:
//! - [`RedisCacheStore`] for shared deployments (`SET … NX PX`).
//! - [`InMemoryCacheStore`] for tests and single-process runs.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use redis::aio::ConnectionManager;

use super::CacheError;
use crate::domain::Clock;

/// Lua script that deletes a key only while it still holds the caller's
/// token.
const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Contract of the key-value store backing the cache and the lock manager.
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Returns the live value for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store is unreachable.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Writes `value` under `key` with the given expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store is unreachable.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Writes `value` only if `key` is absent. Returns `true` on success.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store is unreachable.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, CacheError>;

    /// Deletes `key` only if it currently holds `expected`. Returns `true`
    /// if a key was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store is unreachable.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, CacheError>;
}

// ── Redis ───────────────────────────────────────────────────────────────

/// Redis-backed cache store.
///
/// Uses a [`ConnectionManager`], which multiplexes one connection and
/// reconnects transparently; clones share the connection.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheStore").finish_non_exhaustive()
    }
}

impl RedisCacheStore {
    /// Connects to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the URL is invalid or the server
    /// is unreachable.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("connected to redis cache store");
        Ok(Self { conn })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }
}

// ── In-memory ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local cache store with lazy expiry.
///
/// Expiry is evaluated against the injected [`Clock`], so tests driving a
/// manual clock see entries expire deterministically.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let now = self.clock.now();
        now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns the expiry of a live key. Intended for inspection in tests
    /// and diagnostics.
    #[must_use]
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at)
    }

    /// Drops all expired entries.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Returns the number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = self.expiry(ttl);
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at: self.expiry(ttl),
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return Ok(false);
                }
                occupied.insert(stored);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                Ok(true)
            }
        }
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove_if(key, |_, entry| {
                entry.value == expected && entry.expires_at > now
            })
            .is_some())
    }
}
