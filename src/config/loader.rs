//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    instances = config.instances.len(),
    default_interval_ms = config.sync.default_interval_ms,
    max_concurrent_checks = config.health.max_concurrent_checks,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty, unique instance definitions
/// - At least one feed per instance
/// - One adapter endpoint per (protocol, chain) health target
/// - Positive intervals, retry budgets and batch sizes
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.instances.is_empty(),
    "At least one instance must be configured"
  );

  let mut seen = HashSet::new();
  let mut endpoints = HashMap::new();
  for (i, instance) in config.instances.iter().enumerate() {
    anyhow::ensure!(
      !instance.instance_id.trim().is_empty(),
      "Instance {} has empty instance_id",
      i
    );
    anyhow::ensure!(
      seen.insert(instance.instance_id.as_str()),
      "Duplicate instance_id: {}",
      instance.instance_id
    );
    anyhow::ensure!(
      !instance.chain.trim().is_empty(),
      "Instance {} has empty chain",
      instance.instance_id
    );
    anyhow::ensure!(
      !instance.adapter_config.feeds.is_empty(),
      "Instance {} has no feeds",
      instance.instance_id
    );
    anyhow::ensure!(
      instance.sync_interval_ms != Some(0),
      "Instance {} has zero sync_interval_ms",
      instance.instance_id
    );

    // Health targets merge instances by (protocol, chain) and check every
    // feed through a single adapter.
    let endpoint = instance.adapter_config.endpoint.trim_end_matches('/');
    let first = endpoints
      .entry((instance.protocol, instance.chain.as_str()))
      .or_insert((instance.instance_id.as_str(), endpoint));
    anyhow::ensure!(
      first.1 == endpoint,
      "Instances {} and {} share {}/{} but use different endpoints ({} vs {})",
      first.0,
      instance.instance_id,
      instance.protocol,
      instance.chain,
      first.1,
      endpoint
    );
  }

  // Sync validation
  anyhow::ensure!(
    config.sync.default_interval_ms > 0,
    "sync.default_interval_ms must be positive"
  );
  anyhow::ensure!(
    config.sync.max_retries >= 1,
    "sync.max_retries must be at least 1, got {}",
    config.sync.max_retries
  );
  anyhow::ensure!(
    config.sync.batch_size >= 1,
    "sync.batch_size must be at least 1"
  );

  // Health validation
  anyhow::ensure!(
    config.health.check_interval_ms > 0,
    "health.check_interval_ms must be positive"
  );
  anyhow::ensure!(
    config.health.max_concurrent_checks >= 1,
    "health.max_concurrent_checks must be at least 1, got {}",
    config.health.max_concurrent_checks
  );

  Ok(())
}
