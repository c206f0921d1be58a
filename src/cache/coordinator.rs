//! Stampede-avoiding lookups for names and prices.
//!
//! Two layers keep an expensive external fact from being fetched more than
//! once:
//!
//! 1. **In-process**: a map of in-flight [`Shared`] futures keyed by cache
//!    key. Concurrent callers in this process await the same lookup.
//! 2. **Cross-process**: the single in-process lookup checks the cache,
//!    then takes `lock:<key>`. The holder re-checks the cache, fetches,
//!    writes the value with a TTL chosen by the fact's age and releases.
//!    A process that loses the lock polls the cache up to the lock
//!    manager's `max_wait` and returns `None` ("unknown for now") on
//!    timeout.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use super::{CacheError, CacheStore, LockConfig, LockManager, TtlPolicy};
use crate::domain::Clock;
use crate::resolver::{NameResolver, PriceResolver, ResolveError};

/// First mainnet block with the ENS registry. Reverse lookups for earlier
/// blocks cannot have an answer.
pub const ENS_DEPLOYMENT_BLOCK: u64 = 9_380_380;

const HOUR_SECS: i64 = 3_600;

/// Truncates `at` to the start of its UTC hour.
#[must_use]
pub fn hour_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    let ts = at.timestamp();
    DateTime::from_timestamp(ts - ts.rem_euclid(HOUR_SECS), 0).unwrap_or(at)
}

/// Cache key for the ETH/USD price of the hour starting at `hour_start`.
#[must_use]
pub fn price_key(hour_start: DateTime<Utc>) -> String {
    format!("price:eth_usd:{}", hour_start.timestamp())
}

/// Cache key for the reverse-resolved name of `address`.
#[must_use]
pub fn name_key(address: &str) -> String {
    format!("name:{}", address.to_ascii_lowercase())
}

/// What to fetch on a miss.
#[derive(Debug, Clone)]
enum Fact {
    Name { address: String },
    Price { hour_start: DateTime<Utc> },
}

type Lookup = Shared<BoxFuture<'static, Result<Option<String>, ResolveError>>>;

struct Inner {
    store: Arc<dyn CacheStore>,
    locks: LockManager,
    names: Arc<dyn NameResolver>,
    prices: Arc<dyn PriceResolver>,
    clock: Arc<dyn Clock>,
    name_policy: TtlPolicy,
    price_policy: TtlPolicy,
    in_flight: DashMap<String, (u64, Lookup)>,
    generation: AtomicU64,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("store", &self.store)
            .field("locks", &self.locks)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Cache → lock → re-check → fetch → write → release.
    async fn locked_lookup(
        self: Arc<Self>,
        key: String,
        fact: Fact,
        ttl: Duration,
    ) -> Result<Option<String>, ResolveError> {
        if let Some(hit) = self.store.get(&key).await? {
            return Ok(Some(hit));
        }

        let Some(guard) = self.locks.try_acquire(&key).await? else {
            return Ok(self.locks.wait_for_value(&key).await?);
        };

        let result = self.fill(&key, &fact, ttl).await;
        if let Err(err) = guard.release().await {
            tracing::warn!(key, error = %err, "failed to release cache lock");
        }
        result.map(Some)
    }

    async fn fill(&self, key: &str, fact: &Fact, ttl: Duration) -> Result<String, ResolveError> {
        if let Some(hit) = self.store.get(key).await? {
            return Ok(hit);
        }

        let value = match fact {
            Fact::Name { address } => self
                .names
                .resolve_name(address)
                .await?
                .unwrap_or_default(),
            Fact::Price { hour_start } => self.prices.eth_usd_at(*hour_start).await?.to_string(),
        };

        if let Err(err) = self.store.set(key, &value, ttl).await {
            tracing::warn!(key, error = %err, "fetched value could not be cached");
        } else {
            tracing::debug!(key, ttl_secs = ttl.as_secs(), "cache filled");
        }
        Ok(value)
    }
}

/// Entry point for name and price lookups.
///
/// Cheap to clone; clones share the in-flight map.
#[derive(Debug, Clone)]
pub struct CacheCoordinator {
    inner: Arc<Inner>,
}

impl CacheCoordinator {
    /// Creates a coordinator with the default TTL policies.
    #[must_use]
    pub fn new(
        store: Arc<dyn CacheStore>,
        names: Arc<dyn NameResolver>,
        prices: Arc<dyn PriceResolver>,
        clock: Arc<dyn Clock>,
        lock_config: LockConfig,
    ) -> Self {
        Self::with_policies(
            store,
            names,
            prices,
            clock,
            lock_config,
            TtlPolicy::name(),
            TtlPolicy::price(),
        )
    }

    /// Creates a coordinator with explicit TTL policies.
    #[must_use]
    pub fn with_policies(
        store: Arc<dyn CacheStore>,
        names: Arc<dyn NameResolver>,
        prices: Arc<dyn PriceResolver>,
        clock: Arc<dyn Clock>,
        lock_config: LockConfig,
        name_policy: TtlPolicy,
        price_policy: TtlPolicy,
    ) -> Self {
        let locks = LockManager::new(Arc::clone(&store), Arc::clone(&clock), lock_config);
        Self {
            inner: Arc::new(Inner {
                store,
                locks,
                names,
                prices,
                clock,
                name_policy,
                price_policy,
                in_flight: DashMap::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Resolves the primary name of `address` as of an event at
    /// `block_number`/`observed_at`.
    ///
    /// `Ok(None)` means "no name known right now": the address has no
    /// name, the block predates the resolver's deployment, or another
    /// process is fetching and did not finish within the wait.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the resolver or the cache fails.
    pub async fn resolve_name(
        &self,
        address: &str,
        block_number: u64,
        observed_at: DateTime<Utc>,
    ) -> Result<Option<String>, ResolveError> {
        if block_number < ENS_DEPLOYMENT_BLOCK {
            tracing::trace!(address, block_number, "block predates ENS, skipping lookup");
            return Ok(None);
        }
        let address = address.to_ascii_lowercase();
        let ttl = self.inner.name_policy.ttl_for_age(self.age_of(observed_at));
        let raw = self
            .lookup(name_key(&address), Fact::Name { address }, ttl)
            .await?;
        Ok(raw.filter(|name| !name.is_empty()))
    }

    /// Resolves the ETH/USD price for the hour containing `at`.
    ///
    /// `Ok(None)` means another process is fetching the same hour and did
    /// not finish within the wait.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the resolver or the cache fails, or
    /// the cached value is not a number.
    pub async fn resolve_price(&self, at: DateTime<Utc>) -> Result<Option<f64>, ResolveError> {
        let hour_start = hour_bucket(at);
        let key = price_key(hour_start);
        let ttl = self.inner.price_policy.ttl_for_age(self.age_of(hour_start));
        let Some(raw) = self
            .lookup(key.clone(), Fact::Price { hour_start }, ttl)
            .await?
        else {
            return Ok(None);
        };
        raw.parse::<f64>().map(Some).map_err(|err| {
            ResolveError::Cache(CacheError::Corrupt {
                key,
                reason: err.to_string(),
            })
        })
    }

    /// Returns the number of lookups currently in flight in this process.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    fn age_of(&self, at: DateTime<Utc>) -> Duration {
        (self.inner.clock.now() - at).to_std().unwrap_or_default()
    }

    /// Joins an in-flight lookup for `key` or starts one.
    async fn lookup(
        &self,
        key: String,
        fact: Fact,
        ttl: Duration,
    ) -> Result<Option<String>, ResolveError> {
        let (generation, shared) = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                tracing::trace!(key, "joining in-flight lookup");
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => {
                let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
                let lookup = Arc::clone(&self.inner)
                    .locked_lookup(key.clone(), fact, ttl)
                    .boxed()
                    .shared();
                vacant.insert((generation, lookup.clone()));
                (generation, lookup)
            }
        };

        let result = shared.await;
        self.inner
            .in_flight
            .remove_if(&key, |_, (current, _)| *current == generation);
        result
    }
}
