//! Oracle Adapter Port - Opaque Protocol Capability
//!
//! The engine never assumes HTTP, RPC or contract-call shape. A protocol
//! is reachable through exactly two calls: fetch a reading, and report
//! the health of a feed. Adapters enforce their own I/O timeouts.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::feed::{AdapterConfig, Reading};
use crate::domain::health::FeedObservation;

/// Capability of one protocol adapter bound to a chain and endpoint.
#[async_trait]
pub trait OracleAdapter: Send + Sync + 'static {
  /// Fetch a fresh reading for a feed.
  async fn fetch_price(&self, feed_id: &str) -> anyhow::Result<Reading>;

  /// Observe a feed's health.
  ///
  /// The default derives the observation from `fetch_price`; adapters
  /// with richer status (paused feeds, incomplete rounds) override it.
  async fn check_feed_health(&self, feed_id: &str) -> anyhow::Result<FeedObservation> {
    let reading = self.fetch_price(feed_id).await?;
    let mut observation = FeedObservation {
      last_update: Some(reading.origin_timestamp),
      ..FeedObservation::default()
    };
    observation
      .details
      .insert("value".to_string(), serde_json::Value::from(reading.value));
    if let Some(block) = reading.block_number {
      observation
        .details
        .insert("block_number".to_string(), serde_json::Value::from(block));
    }
    Ok(observation)
  }
}

/// Builds adapters for one protocol.
///
/// Called lazily by the registry the first time a (chain, endpoint)
/// pair is needed; the adapter is cached afterwards.
pub trait AdapterFactory: Send + Sync + 'static {
  fn create(
    &self,
    chain: &str,
    config: &AdapterConfig,
  ) -> anyhow::Result<Arc<dyn OracleAdapter>>;
}
