//! Sync Ports - Per-protocol Sync Functions and the Shared Price Sink
//!
//! A sync function turns one instance into a list of records; the price
//! writer is the single sink every protocol's records flow into.

use async_trait::async_trait;

use crate::config::SyncConfig;
use crate::domain::feed::{AdapterConfig, PriceFeedRecord, Protocol};

/// Everything a sync function gets for one invocation.
#[derive(Debug, Clone)]
pub struct SyncContext {
  pub instance_id: String,
  pub protocol: Protocol,
  pub chain: String,
  /// Endpoint from the instance's adapter config.
  pub rpc_url: String,
  pub adapter_config: AdapterConfig,
  /// Effective scheduler settings for this instance.
  pub config: SyncConfig,
}

/// Produces records for one instance.
#[async_trait]
pub trait SyncFunction: Send + Sync + 'static {
  async fn sync(&self, ctx: &SyncContext) -> anyhow::Result<Vec<PriceFeedRecord>>;
}

/// Sink for produced records.
#[async_trait]
pub trait PriceWriter: Send + Sync + 'static {
  async fn write(&self, records: &[PriceFeedRecord]) -> anyhow::Result<()>;
}
