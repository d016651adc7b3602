//! Persistence Gateway Port - Narrow Upsert/Read Store Interface
//!
//! Three keyed tables:
//! - price rows keyed by (protocol, chain, instance, symbol, timestamp)
//! - health rows keyed by (protocol, chain, feed id)
//! - sync-state rows keyed by instance id
//!
//! Upserts overwrite mutable fields only; identity never changes.

use async_trait::async_trait;

use crate::domain::feed::{PriceFeedKey, PriceFeedRecord, Protocol};
use crate::domain::health::HealthCheckResult;
use crate::domain::sync::SyncStateRecord;

/// Durable store for readings, verdicts and sync progress.
#[async_trait]
pub trait PersistenceGateway: Send + Sync + 'static {
  /// Upsert a batch of price rows.
  async fn upsert_price_feeds(&self, records: &[PriceFeedRecord]) -> anyhow::Result<()>;

  /// Read a price row by its full key.
  async fn get_price_feed(&self, key: &PriceFeedKey) -> anyhow::Result<Option<PriceFeedRecord>>;

  /// Upsert the latest verdict of a feed.
  async fn upsert_health_check(&self, result: &HealthCheckResult) -> anyhow::Result<()>;

  /// Read the latest persisted verdict of a feed.
  async fn get_health_check(
    &self,
    protocol: Protocol,
    chain: &str,
    feed_id: &str,
  ) -> anyhow::Result<Option<HealthCheckResult>>;

  /// Upsert the sync-state row of an instance.
  async fn upsert_sync_state(
    &self,
    instance_id: &str,
    record: &SyncStateRecord,
  ) -> anyhow::Result<()>;

  /// Read the sync-state row of an instance.
  async fn get_sync_state(&self, instance_id: &str) -> anyhow::Result<Option<SyncStateRecord>>;

  /// Check if the store is reachable and writable.
  async fn is_healthy(&self) -> bool;
}
