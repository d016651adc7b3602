//! Adapter Sync Function - Readings → Price Records
//!
//! Default sync function for a protocol: fetches every configured feed
//! through the protocol adapter, `batch_size` feeds at a time, and turns
//! each reading into a `PriceFeedRecord`. A failing feed is skipped; the
//! cycle only fails when no feed produced a record.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::domain::feed::{MonitoredInstance, PriceFeedRecord, Protocol};
use crate::ports::oracle_adapter::AdapterFactory;
use crate::ports::sync::{SyncContext, SyncFunction};

use super::registry::AdapterCache;

/// Sync function backed by a protocol adapter factory.
pub struct AdapterSyncFunction {
  protocol: Protocol,
  factory: Arc<dyn AdapterFactory>,
  adapters: Arc<AdapterCache>,
}

impl AdapterSyncFunction {
  /// `adapters` is normally the registry's cache, so the health monitor
  /// resolves the same adapter for an endpoint.
  pub fn new(
    protocol: Protocol,
    factory: Arc<dyn AdapterFactory>,
    adapters: Arc<AdapterCache>,
  ) -> Self {
    Self {
      protocol,
      factory,
      adapters,
    }
  }
}

#[async_trait]
impl SyncFunction for AdapterSyncFunction {
  async fn sync(&self, ctx: &SyncContext) -> Result<Vec<PriceFeedRecord>> {
    let adapter = self
      .adapters
      .get_or_create(self.factory.as_ref(), self.protocol, &ctx.chain, &ctx.adapter_config)
      .await?;

    let instance = MonitoredInstance {
      instance_id: ctx.instance_id.clone(),
      protocol: ctx.protocol,
      chain: ctx.chain.clone(),
      sync_interval_ms: None,
      adapter_config: ctx.adapter_config.clone(),
    };

    let feeds = &ctx.adapter_config.feeds;
    let mut records = Vec::with_capacity(feeds.len());
    let mut last_error = None;

    for chunk in feeds.chunks(ctx.config.batch_size.max(1)) {
      let readings = join_all(chunk.iter().map(|feed| {
        let adapter = Arc::clone(&adapter);
        async move {
          adapter
            .fetch_price(feed.id())
            .await
            .with_context(|| format!("fetching {}", feed.symbol))
        }
      }))
      .await;

      for (feed, reading) in chunk.iter().zip(readings) {
        match reading {
          Ok(reading) => records.push(PriceFeedRecord::from_reading(&instance, feed, &reading)),
          Err(e) => {
            warn!(
              instance_id = %ctx.instance_id,
              symbol = %feed.symbol,
              error = %format!("{e:#}"),
              "Feed fetch failed, skipping"
            );
            last_error = Some(e);
          }
        }
      }
    }

    if records.is_empty() {
      if let Some(e) = last_error {
        return Err(e.context(format!("all {} feeds failed", feeds.len())));
      }
    }

    debug!(instance_id = %ctx.instance_id, records = records.len(), "Readings converted");
    Ok(records)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::config::SyncConfig;
  use crate::domain::feed::{AdapterConfig, FeedSpec, Reading};
  use crate::ports::oracle_adapter::OracleAdapter;

  struct PartialAdapter;

  #[async_trait]
  impl OracleAdapter for PartialAdapter {
    async fn fetch_price(&self, feed_id: &str) -> Result<Reading> {
      if feed_id == "BAD/USD" {
        anyhow::bail!("feed paused");
      }
      Ok(Reading {
        value: 42.0,
        origin_timestamp: Utc::now(),
        block_number: Some(10),
        confidence: Some(0.9),
      })
    }
  }

  struct PartialFactory;

  impl AdapterFactory for PartialFactory {
    fn create(&self, _chain: &str, _config: &AdapterConfig) -> Result<Arc<dyn OracleAdapter>> {
      Ok(Arc::new(PartialAdapter))
    }
  }

  fn ctx(symbols: &[&str]) -> SyncContext {
    SyncContext {
      instance_id: "dia-eth".to_string(),
      protocol: Protocol::Dia,
      chain: "ethereum".to_string(),
      rpc_url: "http://node".to_string(),
      adapter_config: AdapterConfig {
        endpoint: "http://node".to_string(),
        feeds: symbols
          .iter()
          .map(|s| FeedSpec {
            symbol: (*s).to_string(),
            feed_id: None,
          })
          .collect(),
        ..AdapterConfig::default()
      },
      config: SyncConfig {
        batch_size: 2,
        ..SyncConfig::default()
      },
    }
  }

  #[tokio::test]
  async fn test_failed_feeds_are_skipped() {
    let sync_fn = AdapterSyncFunction::new(
      Protocol::Dia,
      Arc::new(PartialFactory),
      Arc::new(AdapterCache::new()),
    );
    let records = sync_fn
      .sync(&ctx(&["ETH/USD", "BAD/USD", "BTC/USD"]))
      .await
      .unwrap();

    let symbols: Vec<_> = records.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["ETH/USD", "BTC/USD"]);
    assert_eq!(records[0].instance_id, "dia-eth");
    assert_eq!(records[0].confidence, 0.9);
  }

  #[tokio::test]
  async fn test_all_feeds_failing_fails_the_sync() {
    let sync_fn = AdapterSyncFunction::new(
      Protocol::Dia,
      Arc::new(PartialFactory),
      Arc::new(AdapterCache::new()),
    );
    let err = sync_fn.sync(&ctx(&["BAD/USD"])).await.unwrap_err();
    assert!(format!("{err:#}").contains("feed paused"));
  }
}
