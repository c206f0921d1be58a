//! HTTP resolvers backed by `reqwest`.
//!
//! Both clients are built with a request timeout so a slow upstream turns
//! into [`ResolveError::Timeout`] instead of a hung enrichment job.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{NameResolver, PriceResolver, ResolveError};

/// Default per-request timeout for resolver calls (5 seconds).
pub const DEFAULT_RESOLVER_TIMEOUT: Duration = Duration::from_secs(5);

fn build_client(timeout: Duration) -> Result<reqwest::Client, ResolveError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("auction-enricher/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ResolveError::from)
}

/// Reverse-resolution API response: `{ "name": "alice.eth" | null, ... }`.
#[derive(Debug, Deserialize)]
struct NameResponse {
    #[serde(default)]
    name: Option<String>,
}

/// Name resolver calling `GET {base_url}/ens/resolve/{address}`.
#[derive(Debug, Clone)]
pub struct HttpNameResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNameResolver {
    /// Creates a resolver against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NameResolver for HttpNameResolver {
    async fn resolve_name(&self, address: &str) -> Result<Option<String>, ResolveError> {
        let url = format!("{}/ens/resolve/{}", self.base_url, address.to_ascii_lowercase());
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: NameResponse = response.error_for_status()?.json().await?;
        Ok(body.name.filter(|name| !name.trim().is_empty()))
    }
}

/// Range query response: `{ "prices": [[unix_ms, price], ...] }`.
#[derive(Debug, Deserialize)]
struct PriceRangeResponse {
    prices: Vec<(f64, f64)>,
}

/// Price resolver calling
/// `GET {base_url}/coins/ethereum/market_chart/range?vs_currency=usd&from=..&to=..`
/// and taking the first sample of the hour.
#[derive(Debug, Clone)]
pub struct HttpPriceResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceResolver {
    /// Creates a resolver against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceResolver for HttpPriceResolver {
    async fn eth_usd_at(&self, hour_start: DateTime<Utc>) -> Result<f64, ResolveError> {
        let from = hour_start.timestamp();
        let to = from + 3_600;
        let url = format!("{}/coins/ethereum/market_chart/range", self.base_url);
        let body: PriceRangeResponse = self
            .client
            .get(&url)
            .query(&[
                ("vs_currency", "usd".to_string()),
                ("from", from.to_string()),
                ("to", to.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(&(_, price)) = body.prices.first() else {
            return Err(ResolveError::Malformed(format!(
                "no price samples between {from} and {to}"
            )));
        };
        if !price.is_finite() || price <= 0.0 {
            return Err(ResolveError::Malformed(format!("invalid price {price}")));
        }
        Ok(price)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let Ok(resolver) = HttpNameResolver::new("http://localhost:9/", DEFAULT_RESOLVER_TIMEOUT)
        else {
            panic!("client should build");
        };
        assert_eq!(resolver.base_url, "http://localhost:9");
    }

    #[test]
    fn price_samples_parse_as_pairs() {
        let Ok(body) =
            serde_json::from_str::<PriceRangeResponse>(r#"{"prices":[[1000000,3012.5],[1060000,3013.0]]}"#)
        else {
            panic!("parse failed");
        };
        assert_eq!(body.prices.first().map(|p| p.1), Some(3012.5));
    }

    #[test]
    fn name_response_tolerates_missing_name() {
        let Ok(body) = serde_json::from_str::<NameResponse>(r#"{"address":"0x1"}"#) else {
            panic!("parse failed");
        };
        assert!(body.name.is_none());
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_transient_error() {
        let Ok(resolver) =
            HttpPriceResolver::new("http://127.0.0.1:1", Duration::from_millis(500))
        else {
            panic!("client should build");
        };
        let result = resolver.eth_usd_at(Utc::now()).await;
        assert!(matches!(
            result,
            Err(ResolveError::Request(_) | ResolveError::Timeout)
        ));
    }
}
