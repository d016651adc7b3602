//! File Gateway - Concrete Adapter for the Persistence Gateway Port
//!
//! Wraps `RecordLog` (append-only price JSONL) and two `SnapshotStore`s
//! (latest health row and latest sync row per key) behind
//! `PersistenceGateway`. Reads are served from an in-memory index rebuilt
//! from the files at open time.
//!
//! The use cases only know the port, never files or JSON.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use super::memory::MemoryGateway;
use super::records::RecordLog;
use super::state::{HEALTH_FILE, SYNC_STATE_FILE, SnapshotStore};
use crate::domain::feed::{PriceFeedKey, PriceFeedRecord, Protocol};
use crate::domain::health::HealthCheckResult;
use crate::domain::sync::SyncStateRecord;
use crate::ports::gateway::PersistenceGateway;

/// File-backed gateway with an in-memory read index.
pub struct FileGateway {
    index: MemoryGateway,
    records: RecordLog,
    health_store: SnapshotStore<HealthCheckResult>,
    sync_store: SnapshotStore<SyncStateRecord>,
    /// Serialize snapshot writes so a slower save never overwrites a newer one.
    health_write: Mutex<()>,
    sync_write: Mutex<()>,
}

impl FileGateway {
    /// Open (or create) the store under `data_dir` and replay existing files.
    #[instrument]
    pub async fn open(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        let records = RecordLog::new(dir).await?;
        let health_store = SnapshotStore::new(dir, HEALTH_FILE).await?;
        let sync_store = SnapshotStore::new(dir, SYNC_STATE_FILE).await?;
        let index = MemoryGateway::new();

        let prices = records.load_prices().await?;
        index.upsert_price_feeds(&prices).await?;

        let health_rows = health_store.load().await?;
        for result in health_rows.values() {
            index.upsert_health_check(result).await?;
        }

        let sync_rows = sync_store.load().await?;
        for (instance_id, row) in &sync_rows {
            index.upsert_sync_state(instance_id, row).await?;
        }

        info!(
            data_dir,
            prices = index.price_count().await,
            health = health_rows.len(),
            sync_rows = sync_rows.len(),
            "File gateway opened"
        );

        Ok(Self {
            index,
            records,
            health_store,
            sync_store,
            health_write: Mutex::new(()),
            sync_write: Mutex::new(()),
        })
    }
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    async fn upsert_price_feeds(&self, records: &[PriceFeedRecord]) -> Result<()> {
        self.records.append_prices(records).await?;
        self.index.upsert_price_feeds(records).await
    }

    async fn get_price_feed(&self, key: &PriceFeedKey) -> Result<Option<PriceFeedRecord>> {
        self.index.get_price_feed(key).await
    }

    async fn upsert_health_check(&self, result: &HealthCheckResult) -> Result<()> {
        let _write = self.health_write.lock().await;
        self.index.upsert_health_check(result).await?;
        self.health_store.save(&self.index.health_checks().await).await
    }

    async fn get_health_check(
        &self,
        protocol: Protocol,
        chain: &str,
        feed_id: &str,
    ) -> Result<Option<HealthCheckResult>> {
        self.index.get_health_check(protocol, chain, feed_id).await
    }

    async fn upsert_sync_state(&self, instance_id: &str, record: &SyncStateRecord) -> Result<()> {
        let _write = self.sync_write.lock().await;
        self.index.upsert_sync_state(instance_id, record).await?;
        self.sync_store.save(&self.index.sync_states().await).await
    }

    async fn get_sync_state(&self, instance_id: &str) -> Result<Option<SyncStateRecord>> {
        self.index.get_sync_state(instance_id).await
    }

    async fn is_healthy(&self) -> bool {
        self.records.is_healthy().await
            && self.health_store.is_healthy().await
            && self.sync_store.is_healthy().await
    }
}
