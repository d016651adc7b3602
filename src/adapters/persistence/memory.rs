//! Memory Gateway - In-process Upsert Tables
//!
//! Backs tests and serves as the read index of `FileGateway`.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::feed::{PriceFeedKey, PriceFeedRecord, Protocol};
use crate::domain::health::{HealthCheckResult, cache_key};
use crate::domain::sync::SyncStateRecord;
use crate::ports::gateway::PersistenceGateway;

/// Three keyed maps behind async locks.
#[derive(Default)]
pub struct MemoryGateway {
    prices: RwLock<HashMap<PriceFeedKey, PriceFeedRecord>>,
    health: RwLock<HashMap<String, HealthCheckResult>>,
    sync_states: RwLock<HashMap<String, SyncStateRecord>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored price rows.
    pub async fn price_count(&self) -> usize {
        self.prices.read().await.len()
    }

    /// Every stored health row, keyed by `protocol-chain-feed`.
    pub async fn health_checks(&self) -> HashMap<String, HealthCheckResult> {
        self.health.read().await.clone()
    }

    /// Every stored sync-state row.
    pub async fn sync_states(&self) -> HashMap<String, SyncStateRecord> {
        self.sync_states.read().await.clone()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn upsert_price_feeds(&self, records: &[PriceFeedRecord]) -> Result<()> {
        let mut prices = self.prices.write().await;
        for record in records {
            prices
                .entry(record.key())
                .and_modify(|existing| existing.merge_from(record))
                .or_insert_with(|| record.clone());
        }
        Ok(())
    }

    async fn get_price_feed(&self, key: &PriceFeedKey) -> Result<Option<PriceFeedRecord>> {
        Ok(self.prices.read().await.get(key).cloned())
    }

    async fn upsert_health_check(&self, result: &HealthCheckResult) -> Result<()> {
        self.health
            .write()
            .await
            .insert(result.cache_key(), result.clone());
        Ok(())
    }

    async fn get_health_check(
        &self,
        protocol: Protocol,
        chain: &str,
        feed_id: &str,
    ) -> Result<Option<HealthCheckResult>> {
        Ok(self
            .health
            .read()
            .await
            .get(&cache_key(protocol, chain, feed_id))
            .cloned())
    }

    async fn upsert_sync_state(&self, instance_id: &str, record: &SyncStateRecord) -> Result<()> {
        self.sync_states
            .write()
            .await
            .entry(instance_id.to_string())
            .and_modify(|existing| existing.merge_from(record))
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn get_sync_state(&self, instance_id: &str) -> Result<Option<SyncStateRecord>> {
        Ok(self.sync_states.read().await.get(instance_id).cloned())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::sync::SyncStatus;

    fn record(price: f64) -> PriceFeedRecord {
        PriceFeedRecord {
            protocol: Protocol::Chainlink,
            chain: "ethereum".to_string(),
            instance_id: "chainlink-eth".to_string(),
            symbol: "ETH/USD".to_string(),
            base_asset: "ETH".to_string(),
            quote_asset: "USD".to_string(),
            price,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            block_number: Some(19_000_000),
            confidence: 1.0,
            source: "chainlink".to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_price_upsert_overwrites_mutable_fields() {
        let gateway = MemoryGateway::new();
        gateway.upsert_price_feeds(&[record(3000.0)]).await.unwrap();

        let mut newer = record(3001.5);
        newer.block_number = None;
        gateway.upsert_price_feeds(&[newer.clone()]).await.unwrap();

        let stored = gateway.get_price_feed(&newer.key()).await.unwrap().unwrap();
        assert_eq!(gateway.price_count().await, 1);
        assert_eq!(stored.price, 3001.5);
        assert_eq!(stored.block_number, Some(19_000_000));
    }

    #[tokio::test]
    async fn test_sync_state_keeps_last_block() {
        let gateway = MemoryGateway::new();
        let at = Utc::now();
        let healthy = SyncStateRecord {
            last_sync_at: Some(at),
            last_processed_block: Some(42),
            status: SyncStatus::Healthy,
            error_message: None,
            updated_at: at,
        };
        gateway.upsert_sync_state("pyth-sol", &healthy).await.unwrap();

        let failed = SyncStateRecord {
            last_sync_at: None,
            last_processed_block: None,
            status: SyncStatus::Error,
            error_message: Some("rpc down".to_string()),
            updated_at: Utc::now(),
        };
        gateway.upsert_sync_state("pyth-sol", &failed).await.unwrap();

        let stored = gateway.get_sync_state("pyth-sol").await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Error);
        assert_eq!(stored.last_processed_block, Some(42));
        assert_eq!(stored.last_sync_at, Some(at));
    }
}
