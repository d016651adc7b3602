//! Record Log - Append-only JSONL Price Records
//!
//! Price rows go to daily files `prices/YYYY-MM-DD.jsonl`. Each line is
//! one self-contained JSON object; later lines for the same key win on
//! replay.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::domain::feed::PriceFeedRecord;

/// Append-only JSONL writer for price rows.
pub struct RecordLog {
    prices_dir: PathBuf,
}

impl RecordLog {
    /// Create the log directory under `data_dir`.
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let prices_dir = data_dir.join("prices");

        fs::create_dir_all(&prices_dir)
            .await
            .context("Failed to create prices directory")?;

        Ok(Self { prices_dir })
    }

    /// Append a batch of price rows to today's file.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn append_prices(&self, records: &[PriceFeedRecord]) -> Result<()> {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let path = self.prices_dir.join(format!("{date}.jsonl"));
        append_lines(&path, records).await
    }

    /// Every price row from every daily file, oldest file first.
    #[instrument(skip(self))]
    pub async fn load_prices(&self) -> Result<Vec<PriceFeedRecord>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.prices_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                files.push(path);
            }
        }
        files.sort();

        let mut records = Vec::new();
        for path in &files {
            records.extend(read_lines::<PriceFeedRecord>(path).await?);
        }
        info!(count = records.len(), files = files.len(), "Loaded price records");
        Ok(records)
    }

    /// Check if the prices directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let probe = self.prices_dir.join(".health_check");
        let result = fs::write(&probe, b"ok").await;
        let _ = fs::remove_file(&probe).await;
        result.is_ok()
    }
}

async fn append_lines<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut buf = String::new();
    for row in rows {
        buf.push_str(&serde_json::to_string(row).context("Failed to serialize record")?);
        buf.push('\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    file.write_all(buf.as_bytes())
        .await
        .context("Failed to write records")?;
    file.flush().await.context("Failed to flush record log")?;
    Ok(())
}

async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut rows = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(row) => rows.push(row),
            Err(e) => warn!(file = %path.display(), error = %e, "Skipping malformed record"),
        }
    }
    Ok(rows)
}
