//! Health Monitor - Batched Feed Checks per (Protocol, Chain)
//!
//! Each monitored group gets:
//! - one immediate check pass, run before `start_monitoring` returns
//! - a tokio task that runs one pass every `check_interval_ms`
//!
//! A pass checks feeds in batches of `max_concurrent_checks`; a batch
//! must settle before the next one starts. Every verdict, failures
//! included, lands in the in-memory cache and in the gateway.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{HealthConfig, MonitorTarget};
use crate::domain::feed::{AdapterConfig, Protocol};
use crate::domain::health::{
  FeedObservation, HealthCheckResult, PassTally, ProtocolHealthSummary, cache_key,
};
use crate::error::{MonitorError, Result};
use crate::ports::gateway::PersistenceGateway;
use crate::ports::telemetry::MonitorTelemetry;

use super::guard::CycleGuard;
use super::registry::ProtocolRegistry;
use super::retry::maybe_with_timeout;

/// A started (protocol, chain) group.
struct ScheduledMonitor {
  target: MonitorTarget,
  stop_tx: watch::Sender<bool>,
  _handle: JoinHandle<()>,
}

/// Check execution shared with every monitor task.
struct HealthWorker {
  registry: Arc<ProtocolRegistry>,
  gateway: Arc<dyn PersistenceGateway>,
  telemetry: Arc<dyn MonitorTelemetry>,
  config: HealthConfig,
  cache: RwLock<HashMap<String, HealthCheckResult>>,
}

/// Owns one recurring check task per started (protocol, chain).
pub struct HealthMonitor {
  worker: Arc<HealthWorker>,
  monitors: Mutex<HashMap<String, ScheduledMonitor>>,
}

impl HealthMonitor {
  /// Create a monitor reporting every feed check to `telemetry`.
  pub fn new(
    registry: Arc<ProtocolRegistry>,
    gateway: Arc<dyn PersistenceGateway>,
    config: HealthConfig,
    telemetry: Arc<dyn MonitorTelemetry>,
  ) -> Self {
    Self {
      worker: Arc::new(HealthWorker {
        registry,
        gateway,
        telemetry,
        config,
        cache: RwLock::new(HashMap::new()),
      }),
      monitors: Mutex::new(HashMap::new()),
    }
  }

  /// Check one feed. Never fails: an adapter error becomes an unhealthy result.
  pub async fn check_feed_health(
    &self,
    protocol: Protocol,
    chain: &str,
    feed_id: &str,
    adapter_config: &AdapterConfig,
  ) -> HealthCheckResult {
    self
      .worker
      .check_feed(protocol, chain, feed_id, adapter_config)
      .await
  }

  /// Check feeds in bounded batches. Returns one result per feed id, in order.
  pub async fn check_protocol_feeds(
    &self,
    protocol: Protocol,
    chain: &str,
    feed_ids: &[String],
    adapter_config: &AdapterConfig,
  ) -> Vec<HealthCheckResult> {
    self
      .worker
      .check_pass(protocol, chain, feed_ids, adapter_config)
      .await
  }

  /// Start monitoring a (protocol, chain) group.
  ///
  /// Fails with `UnregisteredProtocol` when the protocol has no adapter
  /// factory. Starting a group that is already monitored is a no-op.
  pub async fn start_monitoring(
    &self,
    protocol: Protocol,
    chain: &str,
    feed_ids: Vec<String>,
    adapter_config: AdapterConfig,
  ) -> Result<()> {
    self.worker.registry.ensure_adapter_factory(protocol)?;

    let key = monitor_key(protocol, chain);
    let period = Duration::from_millis(self.worker.config.check_interval_ms.max(1));
    let target = MonitorTarget {
      protocol,
      chain: chain.to_string(),
      feed_ids,
      adapter_config,
    };
    let running = Arc::new(AtomicBool::new(false));

    {
      let mut monitors = self.monitors.lock().await;
      if monitors.contains_key(&key) {
        info!(monitor = %key, "Monitoring already active, start ignored");
        return Ok(());
      }

      let (stop_tx, stop_rx) = watch::channel(false);
      let handle = tokio::spawn(run_monitor(
        Arc::clone(&self.worker),
        target.clone(),
        Arc::clone(&running),
        period,
        stop_rx,
      ));
      monitors.insert(
        key.clone(),
        ScheduledMonitor {
          target: target.clone(),
          stop_tx,
          _handle: handle,
        },
      );
    }

    info!(
      monitor = %key,
      feeds = target.feed_ids.len(),
      interval_ms = period.as_millis() as u64,
      "Monitoring started"
    );

    self.worker.guarded_pass(&target, &running).await;
    Ok(())
  }

  /// Stop a group. Returns whether it was monitored.
  pub async fn stop_monitoring(&self, protocol: Protocol, chain: &str) -> bool {
    let key = monitor_key(protocol, chain);
    match self.monitors.lock().await.remove(&key) {
      Some(monitor) => {
        let _ = monitor.stop_tx.send(true);
        info!(monitor = %key, "Monitoring stopped");
        true
      }
      None => {
        debug!(monitor = %key, "Monitoring not active, stop ignored");
        false
      }
    }
  }

  /// Stop every group. Returns how many were monitored.
  pub async fn stop_all_monitoring(&self) -> usize {
    let drained: Vec<_> = self.monitors.lock().await.drain().collect();
    for (_, monitor) in &drained {
      let _ = monitor.stop_tx.send(true);
    }
    info!(stopped = drained.len(), "All monitoring stopped");
    drained.len()
  }

  /// Monitored groups as `protocol-chain` keys, sorted.
  pub async fn get_active_monitors(&self) -> Vec<String> {
    let mut keys: Vec<_> = self.monitors.lock().await.keys().cloned().collect();
    keys.sort();
    keys
  }

  /// Feed ids watched by a group, if it is monitored.
  pub async fn get_monitored_feeds(&self, protocol: Protocol, chain: &str) -> Option<Vec<String>> {
    self
      .monitors
      .lock()
      .await
      .get(&monitor_key(protocol, chain))
      .map(|m| m.target.feed_ids.clone())
  }

  /// Aggregate of the cached results of a protocol. Zeroed when none exist.
  pub async fn get_protocol_health_summary(&self, protocol: Protocol) -> ProtocolHealthSummary {
    let threshold = self.worker.config.stale_threshold_for(protocol);
    let cache = self.worker.cache.read().await;
    ProtocolHealthSummary::from_results(
      protocol,
      cache.values().filter(|r| r.protocol == protocol),
      threshold,
    )
  }

  /// Cached results with at least one issue, ordered by cache key.
  pub async fn get_unhealthy_feeds(&self) -> Vec<HealthCheckResult> {
    let cache = self.worker.cache.read().await;
    let mut unhealthy: Vec<_> = cache.values().filter(|r| !r.healthy).cloned().collect();
    unhealthy.sort_by_key(HealthCheckResult::cache_key);
    unhealthy
  }

  /// Last cached result of a feed.
  pub async fn get_feed_health(
    &self,
    protocol: Protocol,
    chain: &str,
    feed_id: &str,
  ) -> Option<HealthCheckResult> {
    self
      .worker
      .cache
      .read()
      .await
      .get(&cache_key(protocol, chain, feed_id))
      .cloned()
  }
}

fn monitor_key(protocol: Protocol, chain: &str) -> String {
  format!("{protocol}-{chain}")
}

/// Tick loop of one group. Exits on stop or when the monitor is dropped.
async fn run_monitor(
  worker: Arc<HealthWorker>,
  target: MonitorTarget,
  running: Arc<AtomicBool>,
  period: Duration,
  mut stop_rx: watch::Receiver<bool>,
) {
  let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      biased;
      changed = stop_rx.changed() => {
        if changed.is_err() || *stop_rx.borrow() {
          break;
        }
      }
      _ = ticker.tick() => {
        worker.guarded_pass(&target, &running).await;
      }
    }
  }

  debug!(protocol = %target.protocol, chain = %target.chain, "Health monitor exited");
}

impl HealthWorker {
  /// Scheduled pass, skipped while the previous one is still in flight.
  async fn guarded_pass(&self, target: &MonitorTarget, running: &AtomicBool) {
    let Some(_running) = CycleGuard::try_acquire(running) else {
      debug!(
        protocol = %target.protocol,
        chain = %target.chain,
        "Previous check pass still in flight, skipping"
      );
      return;
    };
    self
      .check_pass(
        target.protocol,
        &target.chain,
        &target.feed_ids,
        &target.adapter_config,
      )
      .await;
  }

  #[instrument(
    skip_all,
    fields(protocol = %protocol, chain = %chain, feeds = feed_ids.len(), cycle_id = %Uuid::new_v4())
  )]
  async fn check_pass(
    &self,
    protocol: Protocol,
    chain: &str,
    feed_ids: &[String],
    adapter_config: &AdapterConfig,
  ) -> Vec<HealthCheckResult> {
    let batch_size = self.config.max_concurrent_checks.max(1);
    let mut results = Vec::with_capacity(feed_ids.len());

    for (batch, chunk) in feed_ids.chunks(batch_size).enumerate() {
      debug!(batch, size = chunk.len(), "Checking batch");
      let checked = join_all(
        chunk
          .iter()
          .map(|feed_id| self.check_feed(protocol, chain, feed_id, adapter_config)),
      )
      .await;
      results.extend(checked);
    }

    let tally = PassTally::from_results(&results, self.config.stale_threshold_for(protocol));
    info!(
      healthy = tally.healthy,
      stale = tally.stale,
      failed = tally.failed,
      "Health check pass complete"
    );
    results
  }

  async fn check_feed(
    &self,
    protocol: Protocol,
    chain: &str,
    feed_id: &str,
    adapter_config: &AdapterConfig,
  ) -> HealthCheckResult {
    let started = Instant::now();
    let observed = self.observe(protocol, chain, feed_id, adapter_config).await;
    let latency_ms = started.elapsed().as_millis() as u64;
    let checked_at = Utc::now();
    let threshold = self.config.stale_threshold_for(protocol);

    let result = match observed {
      Ok(observation) => HealthCheckResult::from_observation(
        protocol,
        chain,
        feed_id,
        observation,
        threshold,
        checked_at,
        latency_ms,
      ),
      Err(e) => {
        warn!(%protocol, chain, feed_id, error = %e, "Feed health check failed");
        HealthCheckResult::failed(protocol, chain, feed_id, &e.to_string(), checked_at, latency_ms)
      }
    };

    self
      .cache
      .write()
      .await
      .insert(result.cache_key(), result.clone());

    if let Err(e) = self.gateway.upsert_health_check(&result).await {
      warn!(
        %protocol,
        chain,
        feed_id,
        error = %MonitorError::persistence(&e),
        "Failed to persist health check"
      );
    }

    self
      .telemetry
      .record_health_check(&result, result.verdict(threshold));
    result
  }

  /// Ask the protocol adapter about a feed.
  async fn observe(
    &self,
    protocol: Protocol,
    chain: &str,
    feed_id: &str,
    adapter_config: &AdapterConfig,
  ) -> Result<FeedObservation> {
    let adapter = self
      .registry
      .resolve_adapter(protocol, chain, adapter_config)
      .await?;

    let guarded = AssertUnwindSafe(adapter.check_feed_health(feed_id)).catch_unwind();
    match maybe_with_timeout(guarded, self.config.adapter_timeout_ms, "health check timed out").await? {
      Ok(Ok(observation)) => Ok(observation),
      Ok(Err(e)) => Err(MonitorError::adapter(&e)),
      Err(_) => Err(MonitorError::Adapter("adapter panicked".to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use chrono::Duration as ChronoDuration;

  use std::sync::Mutex as StdMutex;

  use super::*;
  use crate::adapters::persistence::MemoryGateway;
  use crate::domain::feed::{MonitoredInstance, Reading};
  use crate::domain::health::FeedVerdict;
  use crate::domain::sync::CycleOutcome;
  use crate::ports::oracle_adapter::{AdapterFactory, OracleAdapter};
  use crate::ports::telemetry::NoopTelemetry;

  #[derive(Default)]
  struct RecordingTelemetry {
    checks: StdMutex<Vec<(String, FeedVerdict)>>,
  }

  impl MonitorTelemetry for RecordingTelemetry {
    fn record_sync_cycle(&self, _instance: &MonitoredInstance, _outcome: &CycleOutcome) {}

    fn record_health_check(&self, result: &HealthCheckResult, verdict: FeedVerdict) {
      self
        .checks
        .lock()
        .unwrap()
        .push((result.feed_id.clone(), verdict));
    }
  }

  struct AgedAdapter {
    age_secs: i64,
  }

  #[async_trait]
  impl OracleAdapter for AgedAdapter {
    async fn fetch_price(&self, feed_id: &str) -> anyhow::Result<Reading> {
      if feed_id.starts_with("BROKEN") {
        anyhow::bail!("execution reverted");
      }
      Ok(Reading {
        value: 150.0,
        origin_timestamp: Utc::now() - ChronoDuration::seconds(self.age_secs),
        block_number: Some(7),
        confidence: None,
      })
    }
  }

  struct AgedFactory(i64);

  impl AdapterFactory for AgedFactory {
    fn create(&self, _chain: &str, _config: &AdapterConfig) -> anyhow::Result<Arc<dyn OracleAdapter>> {
      Ok(Arc::new(AgedAdapter { age_secs: self.0 }))
    }
  }

  fn monitor_reporting_to(age_secs: i64, telemetry: Arc<dyn MonitorTelemetry>) -> HealthMonitor {
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
    let mut registry = ProtocolRegistry::new(Arc::clone(&gateway));
    registry.register_adapter_factory(Protocol::Pyth, Arc::new(AgedFactory(age_secs)));
    HealthMonitor::new(Arc::new(registry), gateway, HealthConfig::default(), telemetry)
  }

  fn monitor(age_secs: i64) -> HealthMonitor {
    monitor_reporting_to(age_secs, Arc::new(NoopTelemetry))
  }

  #[tokio::test]
  async fn test_adapter_error_becomes_result() {
    let monitor = monitor(5);
    let result = monitor
      .check_feed_health(Protocol::Pyth, "solana", "BROKEN/USD", &AdapterConfig::default())
      .await;

    assert!(!result.healthy);
    assert!(result.staleness_seconds.is_infinite());
    assert!(result.issues[0].starts_with("Health check failed:"));
    assert!(result.issues[0].contains("execution reverted"));
  }

  #[tokio::test]
  async fn test_unhealthy_feeds_listed_from_cache() {
    let monitor = monitor(5);
    let feeds = vec!["SOL/USD".to_string(), "BROKEN/USD".to_string()];
    let results = monitor
      .check_protocol_feeds(Protocol::Pyth, "solana", &feeds, &AdapterConfig::default())
      .await;
    assert_eq!(results.len(), 2);
    assert!(results[0].healthy);

    let unhealthy = monitor.get_unhealthy_feeds().await;
    assert_eq!(unhealthy.len(), 1);
    assert_eq!(unhealthy[0].feed_id, "BROKEN/USD");

    let summary = monitor.get_protocol_health_summary(Protocol::Pyth).await;
    assert_eq!(summary.total_feeds, 2);
    assert_eq!(summary.healthy_feeds, 1);
  }

  #[tokio::test]
  async fn test_unregistered_protocol_still_yields_result() {
    let monitor = monitor(5);
    let result = monitor
      .check_feed_health(Protocol::Band, "ethereum", "ETH/USD", &AdapterConfig::default())
      .await;
    assert!(!result.healthy);
    assert!(result.issues[0].contains("no adapter factory registered"));
  }

  #[tokio::test]
  async fn test_every_check_reaches_telemetry() {
    let telemetry = Arc::new(RecordingTelemetry::default());
    let monitor = monitor_reporting_to(5, Arc::clone(&telemetry) as Arc<dyn MonitorTelemetry>);

    let feeds = vec!["SOL/USD".to_string(), "BROKEN/USD".to_string()];
    monitor
      .check_protocol_feeds(Protocol::Pyth, "solana", &feeds, &AdapterConfig::default())
      .await;

    let checks = telemetry.checks.lock().unwrap().clone();
    assert_eq!(checks.len(), 2);
    assert!(checks.contains(&("SOL/USD".to_string(), FeedVerdict::Healthy)));
    assert!(checks.iter().any(|(feed, verdict)| feed == "BROKEN/USD" && *verdict != FeedVerdict::Healthy));
  }
}
