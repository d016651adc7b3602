//! HTTP Oracle Adapter - JSON Feed Gateway Client
//!
//! Issues `GET {endpoint}/feeds/{feed_id}`, with the feed id as a single
//! percent-encoded path segment, and expects:
//! `{ "price": f64, "timestamp": unix_seconds, "block_number"?: u64, "confidence"?: f64 }`
//!
//! The reqwest client carries the adapter's own I/O timeout, taken from
//! `AdapterConfig.timeout_ms`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::domain::feed::{AdapterConfig, Protocol, Reading};
use crate::ports::oracle_adapter::{AdapterFactory, OracleAdapter};

/// Adapter I/O timeout when the instance does not set one.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire shape of one feed response.
#[derive(Debug, Deserialize)]
struct FeedResponse {
  price: f64,
  timestamp: i64,
  #[serde(default)]
  block_number: Option<u64>,
  #[serde(default)]
  confidence: Option<f64>,
}

/// Decode a feed response body into a reading.
pub fn parse_feed_response(body: &str) -> Result<Reading> {
  let response: FeedResponse = serde_json::from_str(body).context("Malformed feed response")?;
  if !response.price.is_finite() {
    bail!("feed returned a non-finite price");
  }
  let origin_timestamp = DateTime::from_timestamp(response.timestamp, 0)
    .with_context(|| format!("timestamp out of range: {}", response.timestamp))?;

  Ok(Reading {
    value: response.price,
    origin_timestamp,
    block_number: response.block_number,
    confidence: response.confidence,
  })
}

/// Client for one (protocol, chain, endpoint).
pub struct HttpOracleAdapter {
  http: Client,
  base_url: Url,
  protocol: Protocol,
  chain: String,
}

impl HttpOracleAdapter {
  pub fn new(protocol: Protocol, chain: &str, config: &AdapterConfig) -> Result<Self> {
    let timeout = config
      .timeout_ms
      .map_or(DEFAULT_TIMEOUT, Duration::from_millis);
    let http = Client::builder()
      .timeout(timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    let base_url = Url::parse(&config.endpoint)
      .with_context(|| format!("Invalid adapter endpoint: {}", config.endpoint))?;
    if base_url.cannot_be_a_base() {
      bail!("Adapter endpoint {} cannot carry a path", config.endpoint);
    }

    Ok(Self {
      http,
      base_url,
      protocol,
      chain: chain.to_string(),
    })
  }

  fn feed_url(&self, feed_id: &str) -> Result<Url> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|()| anyhow!("endpoint {} cannot carry a path", self.base_url))?
      .pop_if_empty()
      .push("feeds")
      .push(feed_id);
    Ok(url)
  }
}

#[async_trait]
impl OracleAdapter for HttpOracleAdapter {
  async fn fetch_price(&self, feed_id: &str) -> Result<Reading> {
    let url = self.feed_url(feed_id)?;
    let response = self
      .http
      .get(url.clone())
      .send()
      .await
      .with_context(|| format!("GET {url}"))?;

    let status = response.status();
    let body = response.text().await.context("Failed to read feed response")?;
    match status {
      StatusCode::OK => {}
      StatusCode::NOT_FOUND => bail!("feed {feed_id} not found on {}", self.base_url),
      other => bail!("feed gateway returned {other}: {body}"),
    }

    let reading = parse_feed_response(&body)?;
    debug!(
      protocol = %self.protocol,
      chain = %self.chain,
      feed_id,
      value = reading.value,
      "Reading fetched"
    );
    Ok(reading)
  }
}

/// Builds `HttpOracleAdapter`s for one protocol.
pub struct HttpAdapterFactory {
  protocol: Protocol,
}

impl HttpAdapterFactory {
  pub const fn new(protocol: Protocol) -> Self {
    Self { protocol }
  }
}

impl AdapterFactory for HttpAdapterFactory {
  fn create(&self, chain: &str, config: &AdapterConfig) -> Result<Arc<dyn OracleAdapter>> {
    Ok(Arc::new(HttpOracleAdapter::new(self.protocol, chain, config)?))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_full_response() {
    let reading = parse_feed_response(
      r#"{"price": 3012.55, "timestamp": 1714564800, "block_number": 19780000, "confidence": 0.98}"#,
    )
    .unwrap();
    assert_eq!(reading.value, 3012.55);
    assert_eq!(reading.origin_timestamp.timestamp(), 1_714_564_800);
    assert_eq!(reading.block_number, Some(19_780_000));
    assert_eq!(reading.confidence, Some(0.98));
  }

  #[test]
  fn test_parse_minimal_response() {
    let reading = parse_feed_response(r#"{"price": 1.0001, "timestamp": 1714564800}"#).unwrap();
    assert_eq!(reading.block_number, None);
    assert_eq!(reading.confidence, None);
  }

  #[test]
  fn test_parse_rejects_missing_price() {
    assert!(parse_feed_response(r#"{"timestamp": 1714564800}"#).is_err());
  }

  #[test]
  fn test_feed_url_trims_trailing_slash() {
    let config = AdapterConfig {
      endpoint: "http://gateway.local/".to_string(),
      ..AdapterConfig::default()
    };
    let adapter = HttpOracleAdapter::new(Protocol::Api3, "arbitrum", &config).unwrap();
    assert_eq!(
      adapter.feed_url("0xf403").unwrap().as_str(),
      "http://gateway.local/feeds/0xf403"
    );
  }

  #[test]
  fn test_feed_url_encodes_symbol_as_one_segment() {
    let config = AdapterConfig {
      endpoint: "http://gateway.local/api3/arbitrum".to_string(),
      ..AdapterConfig::default()
    };
    let adapter = HttpOracleAdapter::new(Protocol::Api3, "arbitrum", &config).unwrap();
    let url = adapter.feed_url("ETH/USD").unwrap();
    assert_eq!(url.as_str(), "http://gateway.local/api3/arbitrum/feeds/ETH%2FUSD");
    assert_eq!(url.path_segments().unwrap().count(), 4);
  }

  #[test]
  fn test_rejects_unparseable_endpoint() {
    let config = AdapterConfig {
      endpoint: "gateway without scheme".to_string(),
      ..AdapterConfig::default()
    };
    assert!(HttpOracleAdapter::new(Protocol::Api3, "arbitrum", &config).is_err());
  }
}
