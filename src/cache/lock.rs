//! Distributed lock and wait-for-result built on [`CacheStore`].
//!
//! Acquisition is a single atomic `set-if-absent` on `lock:<key>` carrying a
//! random token and a short TTL. There are no acquisition retries: a caller
//! that loses the race waits for the winner's result instead, polling the
//! value key at a fixed interval up to a maximum wait. Both the TTL and the
//! wait are bounded, so a crashed holder heals once its lock expires and a
//! waiter never blocks longer than `max_wait`.

use std::sync::Arc;
use std::time::Duration;

use super::{CacheError, CacheStore};
use crate::domain::Clock;

/// Default lock TTL (10 seconds).
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

/// Default interval between cache polls while waiting (200 ms).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default maximum time spent waiting for another holder's result (3 s).
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(3);

/// Timing parameters for the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Expiry of the lock key.
    pub ttl: Duration,
    /// Interval between polls of the value key.
    pub poll_interval: Duration,
    /// Upper bound on the total wait.
    pub max_wait: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_LOCK_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// Returns the lock key guarding `key`.
#[must_use]
pub fn lock_key(key: &str) -> String {
    format!("lock:{key}")
}

/// Mutual exclusion and result waiting over a shared cache store.
#[derive(Debug, Clone)]
pub struct LockManager {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    config: LockConfig,
}

impl LockManager {
    /// Creates a lock manager over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, config: LockConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Returns the timing parameters.
    #[must_use]
    pub const fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Tries once to take the lock guarding `key`.
    ///
    /// Returns `None` if another holder owns it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store is unreachable.
    pub async fn try_acquire(&self, key: &str) -> Result<Option<LockGuard>, CacheError> {
        let lock_key = lock_key(key);
        let token = uuid::Uuid::new_v4().to_string();
        let acquired = self
            .store
            .set_if_absent(&lock_key, &token, self.config.ttl)
            .await?;
        if !acquired {
            tracing::debug!(key, "lock held elsewhere");
            return Ok(None);
        }
        Ok(Some(LockGuard {
            store: Arc::clone(&self.store),
            lock_key,
            token,
        }))
    }

    /// Polls `key` until it has a value or `max_wait` elapses.
    ///
    /// Returns `None` on timeout; callers treat that as "temporarily
    /// unknown", not as a negative answer.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store is unreachable.
    pub async fn wait_for_value(&self, key: &str) -> Result<Option<String>, CacheError> {
        let started = self.clock.now();
        loop {
            if let Some(value) = self.store.get(key).await? {
                return Ok(Some(value));
            }
            let elapsed = (self.clock.now() - started).to_std().unwrap_or_default();
            if elapsed >= self.config.max_wait {
                tracing::debug!(key, waited_ms = elapsed.as_millis(), "lock wait timed out");
                return Ok(None);
            }
            self.clock.sleep(self.config.poll_interval).await;
        }
    }
}

/// Proof of holding a lock.
///
/// Release explicitly with [`LockGuard::release`]. A dropped guard leaves
/// the key to expire through its TTL.
#[derive(Debug)]
pub struct LockGuard {
    store: Arc<dyn CacheStore>,
    lock_key: String,
    token: String,
}

impl LockGuard {
    /// Returns the lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.lock_key
    }

    /// Releases the lock if this guard still owns it.
    ///
    /// Returns `false` if the lock had already expired or been taken over.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store is unreachable.
    pub async fn release(self) -> Result<bool, CacheError> {
        let released = self
            .store
            .delete_if_equals(&self.lock_key, &self.token)
            .await?;
        if !released {
            tracing::warn!(key = %self.lock_key, "lock expired before release");
        }
        Ok(released)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::domain::ManualClock;
    use chrono::Utc;

    fn manager() -> (Arc<ManualClock>, Arc<InMemoryCacheStore>, LockManager) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemoryCacheStore::new(Arc::clone(&clock) as Arc<dyn Clock>));
        let locks = LockManager::new(
            Arc::clone(&store) as Arc<dyn CacheStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            LockConfig::default(),
        );
        (clock, store, locks)
    }

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let (_clock, _store, locks) = manager();
        let Ok(Some(guard)) = locks.try_acquire("price:1").await else {
            panic!("first acquire should succeed");
        };
        assert!(matches!(locks.try_acquire("price:1").await, Ok(None)));

        assert!(matches!(guard.release().await, Ok(true)));
        assert!(matches!(locks.try_acquire("price:1").await, Ok(Some(_))));
    }

    #[tokio::test]
    async fn crashed_holder_heals_via_ttl() {
        let (clock, _store, locks) = manager();
        let Ok(Some(guard)) = locks.try_acquire("k").await else {
            panic!("acquire should succeed");
        };
        std::mem::forget(guard);
        clock.advance(DEFAULT_LOCK_TTL);
        assert!(matches!(locks.try_acquire("k").await, Ok(Some(_))));
    }

    #[tokio::test]
    async fn stale_guard_does_not_release_new_holder() {
        let (clock, store, locks) = manager();
        let Ok(Some(stale)) = locks.try_acquire("k").await else {
            panic!("acquire should succeed");
        };
        clock.advance(DEFAULT_LOCK_TTL);
        let Ok(Some(_fresh)) = locks.try_acquire("k").await else {
            panic!("takeover should succeed");
        };
        assert!(matches!(stale.release().await, Ok(false)));
        assert!(store.get("lock:k").await.ok().flatten().is_some());
    }

    #[tokio::test]
    async fn wait_returns_value_once_written() {
        let (_clock, store, locks) = manager();
        let _ = store.set("k", "42", Duration::from_secs(60)).await;
        assert_eq!(locks.wait_for_value("k").await.ok().flatten().as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn wait_gives_up_after_max_wait() {
        let (clock, _store, locks) = manager();
        let started = clock.now();
        assert!(matches!(locks.wait_for_value("never").await, Ok(None)));
        let waited = (clock.now() - started).to_std().unwrap_or_default();
        assert!(waited >= DEFAULT_MAX_WAIT);
        assert!(waited < DEFAULT_MAX_WAIT + DEFAULT_POLL_INTERVAL + DEFAULT_POLL_INTERVAL);
    }
}
