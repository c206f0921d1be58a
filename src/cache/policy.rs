//! Tiered expiry chosen by the age of the cached fact.
//!
//! Facts about the recent past can still move (a price for the current hour,
//! a freshly set reverse record), so they get short TTLs. Facts about the
//! settled past are effectively immutable and are kept for a long time.

use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// TTL tiers keyed by the age of the underlying fact at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// Facts younger than this are "fresh".
    pub fresh_age: Duration,
    /// Facts at least this old are "historical".
    pub historical_age: Duration,
    /// TTL for fresh facts.
    pub fresh_ttl: Duration,
    /// TTL for facts between fresh and historical.
    pub medium_ttl: Duration,
    /// TTL for historical facts.
    pub historical_ttl: Duration,
}

impl TtlPolicy {
    /// Policy for hourly ETH/USD prices.
    #[must_use]
    pub const fn price() -> Self {
        Self {
            fresh_age: Duration::from_secs(HOUR),
            historical_age: Duration::from_secs(7 * DAY),
            fresh_ttl: Duration::from_secs(5 * MINUTE),
            medium_ttl: Duration::from_secs(DAY),
            historical_ttl: Duration::from_secs(365 * DAY),
        }
    }

    /// Policy for reverse-resolved names. Names stay mutable on-chain, so
    /// even the historical tier is capped at a week.
    #[must_use]
    pub const fn name() -> Self {
        Self {
            fresh_age: Duration::from_secs(HOUR),
            historical_age: Duration::from_secs(7 * DAY),
            fresh_ttl: Duration::from_secs(HOUR),
            medium_ttl: Duration::from_secs(DAY),
            historical_ttl: Duration::from_secs(7 * DAY),
        }
    }

    /// Returns the TTL for a fact of the given age.
    #[must_use]
    pub fn ttl_for_age(&self, age: Duration) -> Duration {
        if age < self.fresh_age {
            self.fresh_ttl
        } else if age < self.historical_age {
            self.medium_ttl
        } else {
            self.historical_ttl
        }
    }
}
