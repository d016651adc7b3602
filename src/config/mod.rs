//! Configuration Module - TOML-based Monitor Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Instances, intervals, retry budgets and staleness thresholds are
//! externalized here - nothing is hardcoded in the use cases.

pub mod loader;

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::feed::{AdapterConfig, MonitoredInstance, Protocol};
use crate::usecases::retry::{BackoffStrategy, RetryPolicy};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub service: ServiceConfig,
  /// Sync scheduler defaults.
  #[serde(default)]
  pub sync: SyncConfig,
  /// Health monitor defaults.
  #[serde(default)]
  pub health: HealthConfig,
  /// Monitored instances.
  #[serde(default)]
  pub instances: Vec<MonitoredInstance>,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Sync scheduler settings. Every field can be overridden per `start_sync`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Interval used when an instance has no `sync_interval_ms`.
  pub default_interval_ms: u64,
  /// Attempts per tick before giving up until the next tick.
  pub max_retries: u32,
  /// Base delay between attempts.
  pub retry_delay_ms: u64,
  /// How the delay grows with the attempt number.
  pub backoff: BackoffStrategy,
  /// Feeds fetched concurrently by the adapter-backed sync function.
  pub batch_size: usize,
  /// Optional guard around each sync function call.
  pub adapter_timeout_ms: Option<u64>,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      default_interval_ms: 60_000,
      max_retries: 3,
      retry_delay_ms: 5_000,
      backoff: BackoffStrategy::Linear,
      batch_size: 20,
      adapter_timeout_ms: None,
    }
  }
}

impl SyncConfig {
  /// Interval for an instance: its own setting first, then the default.
  pub fn interval_for(&self, instance: &MonitoredInstance) -> u64 {
    instance.sync_interval_ms.unwrap_or(self.default_interval_ms)
  }

  /// Retry policy of one tick.
  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy::new(self.max_retries, self.retry_delay_ms, self.backoff)
  }
}

/// Health monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
  /// Interval between check passes of one (protocol, chain) group.
  pub check_interval_ms: u64,
  /// Feeds checked concurrently within one batch.
  pub max_concurrent_checks: usize,
  /// Per-protocol staleness overrides (seconds).
  pub stale_threshold_seconds: HashMap<Protocol, u64>,
  /// Optional guard around each adapter health call.
  pub adapter_timeout_ms: Option<u64>,
}

impl Default for HealthConfig {
  fn default() -> Self {
    Self {
      check_interval_ms: 60_000,
      max_concurrent_checks: 5,
      stale_threshold_seconds: HashMap::new(),
      adapter_timeout_ms: None,
    }
  }
}

impl HealthConfig {
  /// Staleness threshold of a protocol: override, else protocol default.
  pub fn stale_threshold_for(&self, protocol: Protocol) -> u64 {
    self
      .stale_threshold_seconds
      .get(&protocol)
      .copied()
      .unwrap_or_else(|| protocol.default_stale_threshold_seconds())
  }
}

/// One (protocol, chain) group watched by the health monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorTarget {
  pub protocol: Protocol,
  pub chain: String,
  pub feed_ids: Vec<String>,
  pub adapter_config: AdapterConfig,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for JSONL logs and sync-state snapshots.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
    }
  }
}

impl AppConfig {
  /// Health targets derived from instances.
  ///
  /// One target per (protocol, chain), first-seen order, with the union of
  /// feed ids. The first instance of a group provides the adapter config;
  /// `validate_config` rejects groups whose instances name different endpoints.
  pub fn monitor_targets(&self) -> Vec<MonitorTarget> {
    let mut targets: Vec<MonitorTarget> = Vec::new();

    for instance in &self.instances {
      let existing = targets
        .iter_mut()
        .find(|t| t.protocol == instance.protocol && t.chain == instance.chain);

      match existing {
        Some(target) => {
          for id in instance.adapter_config.feed_ids() {
            if !target.feed_ids.contains(&id) {
              target.feed_ids.push(id);
            }
          }
        }
        None => targets.push(MonitorTarget {
          protocol: instance.protocol,
          chain: instance.chain.clone(),
          feed_ids: instance.adapter_config.feed_ids(),
          adapter_config: instance.adapter_config.clone(),
        }),
      }
    }

    targets
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_data_dir() -> String {
  "data".to_string()
}
