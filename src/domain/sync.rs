//! Sync Domain - Per-instance Run State and Persisted Sync Rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// In-memory run state of one scheduled instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// True only while a cycle is in flight.
    pub is_running: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_price: Option<f64>,
    /// Failed attempts since the last successful cycle.
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
}

/// Status reported to the persistence gateway after each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Healthy,
    Error,
}

/// Durable sync-state row, keyed by instance id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStateRecord {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_processed_block: Option<u64>,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncStateRecord {
    /// Apply a newer report. A missing block keeps the stored one.
    pub fn merge_from(&mut self, newer: &Self) {
        if newer.last_sync_at.is_some() {
            self.last_sync_at = newer.last_sync_at;
        }
        if newer.last_processed_block.is_some() {
            self.last_processed_block = newer.last_processed_block;
        }
        self.status = newer.status;
        self.error_message.clone_from(&newer.error_message);
        self.updated_at = newer.updated_at;
    }
}

/// How one sync cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Records were produced and written.
    Synced { records: usize, attempts: u32 },
    /// Another cycle for the same instance was still in flight.
    Skipped,
    /// Every attempt of the retry budget failed.
    Exhausted { attempts: u32, last_error: String },
}

impl CycleOutcome {
    /// Short label for logs and metrics.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Synced { .. } => "synced",
            Self::Skipped => "skipped",
            Self::Exhausted { .. } => "exhausted",
        }
    }

    /// Attempts made by the cycle (0 when skipped).
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Synced { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
            Self::Skipped => 0,
        }
    }
}
