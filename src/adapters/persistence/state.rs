//! Snapshot Store - Atomic JSON Snapshot of Keyed Rows
//!
//! Upsert tables whose durable form is "latest row per key" (sync state,
//! health verdicts) live in one JSON object per table, rewritten on every
//! upsert through a tmp file and a rename, so the file is always either
//! the previous or the new version.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Snapshot file for sync-state rows, keyed by instance id.
pub const SYNC_STATE_FILE: &str = "sync_state.json";
/// Snapshot file for health rows, keyed by `protocol-chain-feed`.
pub const HEALTH_FILE: &str = "health_checks.json";

/// Atomic JSON store for one keyed table.
pub struct SnapshotStore<T> {
    state_path: PathBuf,
    tmp_path: PathBuf,
    _rows: PhantomData<fn() -> T>,
}

impl<T> SnapshotStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a store for `file_name` in `data_dir`, creating the directory if needed.
    pub async fn new(data_dir: &Path, file_name: &str) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            state_path: data_dir.join(file_name),
            tmp_path: data_dir.join(format!("{file_name}.tmp")),
            _rows: PhantomData,
        })
    }

    /// Write every row atomically (tmp → rename).
    #[instrument(skip(self, rows), fields(file = %self.state_path.display(), rows = rows.len()))]
    pub async fn save(&self, rows: &HashMap<String, T>) -> Result<()> {
        let json = serde_json::to_string_pretty(rows).context("Failed to serialize snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp snapshot file")?;
        fs::rename(&self.tmp_path, &self.state_path)
            .await
            .context("Failed to rename snapshot file")?;

        debug!("Snapshot saved");
        Ok(())
    }

    /// Load the last snapshot; empty on first start.
    pub async fn load(&self) -> Result<HashMap<String, T>> {
        if !self.state_path.exists() {
            info!(file = %self.state_path.display(), "No snapshot found, starting fresh");
            return Ok(HashMap::new());
        }

        let json = fs::read_to_string(&self.state_path)
            .await
            .with_context(|| format!("Failed to read {}", self.state_path.display()))?;
        let rows: HashMap<String, T> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", self.state_path.display()))?;

        info!(file = %self.state_path.display(), rows = rows.len(), "Snapshot loaded");
        Ok(rows)
    }

    /// Check if the snapshot, when present, is readable.
    pub async fn is_healthy(&self) -> bool {
        if !self.state_path.exists() {
            return true;
        }
        fs::metadata(&self.state_path).await.is_ok()
    }
}
