//! Static resolvers for offline runs and tests.
//!
//! Answers come from fixed data. Each resolver counts its calls and can be
//! told to delay or to fail the next few calls with a timeout, which is how
//! stampede and retry behavior is exercised without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{NameResolver, PriceResolver, ResolveError};

#[derive(Debug, Default)]
struct Behavior {
    delay: Duration,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl Behavior {
    async fn call(&self) -> Result<(), ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ResolveError::Timeout);
        }
        Ok(())
    }
}

/// Name resolver answering from a fixed address book.
#[derive(Debug, Default)]
pub struct StaticNameResolver {
    names: HashMap<String, String>,
    behavior: Behavior,
}

impl StaticNameResolver {
    /// Creates a resolver that knows no names.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` for `address`.
    #[must_use]
    pub fn with_name(mut self, address: &str, name: &str) -> Self {
        self.names
            .insert(address.to_ascii_lowercase(), name.to_string());
        self
    }

    /// Delays every answer by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.behavior.delay = delay;
        self
    }

    /// Fails the next `count` calls with [`ResolveError::Timeout`].
    pub fn fail_next(&self, count: usize) {
        self.behavior.failures_left.store(count, Ordering::SeqCst);
    }

    /// Returns how many lookups were made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.behavior.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameResolver for StaticNameResolver {
    async fn resolve_name(&self, address: &str) -> Result<Option<String>, ResolveError> {
        self.behavior.call().await?;
        Ok(self.names.get(&address.to_ascii_lowercase()).cloned())
    }
}

/// Price resolver answering a constant ETH/USD price.
#[derive(Debug)]
pub struct StaticPriceResolver {
    price: f64,
    behavior: Behavior,
}

impl StaticPriceResolver {
    /// Creates a resolver that always answers `price`.
    #[must_use]
    pub fn new(price: f64) -> Self {
        Self {
            price,
            behavior: Behavior::default(),
        }
    }

    /// Delays every answer by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.behavior.delay = delay;
        self
    }

    /// Fails the next `count` calls with [`ResolveError::Timeout`].
    pub fn fail_next(&self, count: usize) {
        self.behavior.failures_left.store(count, Ordering::SeqCst);
    }

    /// Returns how many lookups were made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.behavior.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceResolver for StaticPriceResolver {
    async fn eth_usd_at(&self, _hour_start: DateTime<Utc>) -> Result<f64, ResolveError> {
        self.behavior.call().await?;
        Ok(self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn names_are_case_insensitive() {
        let resolver = StaticNameResolver::new().with_name("0xABC", "bob.eth");
        let name = resolver.resolve_name("0xabc").await;
        assert_eq!(name.ok().flatten().as_deref(), Some("bob.eth"));
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let resolver = StaticPriceResolver::new(2_000.0);
        resolver.fail_next(2);
        assert!(resolver.eth_usd_at(Utc::now()).await.is_err());
        assert!(resolver.eth_usd_at(Utc::now()).await.is_err());
        assert_eq!(resolver.eth_usd_at(Utc::now()).await.ok(), Some(2_000.0));
        assert_eq!(resolver.calls(), 3);
    }
}
