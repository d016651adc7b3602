//! Sync Scheduler - One Recurring Task per Monitored Instance
//!
//! Each started instance gets:
//! - one immediate cycle, run before `start_sync` returns
//! - a tokio task that ticks every interval and runs one cycle per tick
//!
//! A cycle calls the protocol's sync function, writes the records through
//! the registry's price writer and reports the outcome to the gateway.
//! Failed attempts are retried in a bounded loop with backoff. Ticks that
//! land while a cycle is still in flight are skipped, never queued.
//! Stopping removes the schedule; an in-flight cycle finishes on its own.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::domain::feed::{MonitoredInstance, PriceFeedRecord};
use crate::domain::sync::{CycleOutcome, SyncState, SyncStateRecord, SyncStatus};
use crate::error::{MonitorError, Result};
use crate::ports::catalog::InstanceCatalog;
use crate::ports::gateway::PersistenceGateway;
use crate::ports::sync::SyncContext;
use crate::ports::telemetry::MonitorTelemetry;

use super::guard::CycleGuard;
use super::registry::ProtocolRegistry;
use super::retry::maybe_with_timeout;

/// Run state shared between a schedule task and readers.
#[derive(Default)]
struct SyncSlot {
  /// Set for the duration of one cycle.
  running: AtomicBool,
  /// Everything except `is_running`, which lives in the atomic.
  state: RwLock<SyncState>,
}

impl SyncSlot {
  async fn snapshot(&self) -> SyncState {
    let mut state = self.state.read().await.clone();
    state.is_running = self.running.load(Ordering::Acquire);
    state
  }
}

/// A started instance.
struct ScheduledSync {
  instance: MonitoredInstance,
  config: SyncConfig,
  slot: Arc<SyncSlot>,
  stop_tx: watch::Sender<bool>,
  _handle: JoinHandle<()>,
}

/// Cycle execution shared with every schedule task.
struct SyncWorker {
  registry: Arc<ProtocolRegistry>,
  gateway: Arc<dyn PersistenceGateway>,
  telemetry: Arc<dyn MonitorTelemetry>,
}

/// Owns one recurring sync task per started instance.
pub struct SyncScheduler {
  worker: Arc<SyncWorker>,
  catalog: Arc<dyn InstanceCatalog>,
  defaults: SyncConfig,
  schedules: Mutex<HashMap<String, ScheduledSync>>,
}

impl SyncScheduler {
  /// Create a scheduler reporting every cycle to `telemetry`.
  /// Nothing runs until `start_sync`.
  pub fn new(
    registry: Arc<ProtocolRegistry>,
    catalog: Arc<dyn InstanceCatalog>,
    gateway: Arc<dyn PersistenceGateway>,
    defaults: SyncConfig,
    telemetry: Arc<dyn MonitorTelemetry>,
  ) -> Self {
    Self {
      worker: Arc::new(SyncWorker {
        registry,
        gateway,
        telemetry,
      }),
      catalog,
      defaults,
      schedules: Mutex::new(HashMap::new()),
    }
  }

  /// Start syncing an instance.
  ///
  /// Fails with `NotFound` for an unknown instance and with
  /// `UnregisteredProtocol` when its protocol has no sync function.
  /// Starting an instance that is already scheduled is a no-op.
  pub async fn start_sync(&self, instance_id: &str, overrides: Option<SyncConfig>) -> Result<()> {
    let instance = self
      .catalog
      .get_instance(instance_id)
      .ok_or_else(|| MonitorError::NotFound(instance_id.to_string()))?;
    self.worker.registry.sync_function(instance.protocol)?;

    let config = overrides.unwrap_or_else(|| self.defaults.clone());
    let period = Duration::from_millis(config.interval_for(&instance).max(1));

    let slot = {
      let mut schedules = self.schedules.lock().await;
      if schedules.contains_key(instance_id) {
        info!(instance_id, "Sync already running, start ignored");
        return Ok(());
      }

      let slot = Arc::new(SyncSlot::default());
      let (stop_tx, stop_rx) = watch::channel(false);
      let handle = tokio::spawn(run_schedule(
        Arc::clone(&self.worker),
        instance.clone(),
        config.clone(),
        Arc::clone(&slot),
        period,
        stop_rx,
      ));

      schedules.insert(
        instance_id.to_string(),
        ScheduledSync {
          instance: instance.clone(),
          config: config.clone(),
          slot: Arc::clone(&slot),
          stop_tx,
          _handle: handle,
        },
      );
      slot
    };

    info!(
      instance_id,
      protocol = %instance.protocol,
      chain = %instance.chain,
      interval_ms = period.as_millis() as u64,
      "Sync started"
    );

    self.worker.run_cycle(&instance, &config, &slot).await;
    Ok(())
  }

  /// Run one cycle now for a scheduled instance.
  pub async fn trigger_sync(&self, instance_id: &str) -> Result<CycleOutcome> {
    let (instance, config, slot) = {
      let schedules = self.schedules.lock().await;
      let scheduled = schedules
        .get(instance_id)
        .ok_or_else(|| MonitorError::NotFound(instance_id.to_string()))?;
      (
        scheduled.instance.clone(),
        scheduled.config.clone(),
        Arc::clone(&scheduled.slot),
      )
    };
    Ok(self.worker.run_cycle(&instance, &config, &slot).await)
  }

  /// Stop an instance and drop its state. Returns whether it was scheduled.
  pub async fn stop_sync(&self, instance_id: &str) -> bool {
    let removed = self.schedules.lock().await.remove(instance_id);
    match removed {
      Some(scheduled) => {
        let _ = scheduled.stop_tx.send(true);
        info!(instance_id, "Sync stopped");
        true
      }
      None => {
        debug!(instance_id, "Sync not running, stop ignored");
        false
      }
    }
  }

  /// Stop every instance. Returns how many were scheduled.
  pub async fn stop_all_syncs(&self) -> usize {
    let drained: Vec<_> = self.schedules.lock().await.drain().collect();
    for (_, scheduled) in &drained {
      let _ = scheduled.stop_tx.send(true);
    }
    info!(stopped = drained.len(), "All syncs stopped");
    drained.len()
  }

  /// Snapshot of an instance's run state.
  pub async fn get_sync_state(&self, instance_id: &str) -> Option<SyncState> {
    let slot = self
      .schedules
      .lock()
      .await
      .get(instance_id)
      .map(|s| Arc::clone(&s.slot))?;
    Some(slot.snapshot().await)
  }

  /// Ids of scheduled instances, sorted.
  pub async fn get_running_syncs(&self) -> Vec<String> {
    let mut ids: Vec<_> = self.schedules.lock().await.keys().cloned().collect();
    ids.sort();
    ids
  }
}

/// Tick loop of one instance. Exits on stop or when the scheduler is dropped.
async fn run_schedule(
  worker: Arc<SyncWorker>,
  instance: MonitoredInstance,
  config: SyncConfig,
  slot: Arc<SyncSlot>,
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
        worker.run_cycle(&instance, &config, &slot).await;
      }
    }
  }

  debug!(instance_id = %instance.instance_id, "Sync schedule exited");
}

impl SyncWorker {
  /// One cycle: overlap guard, then the bounded retry loop.
  #[instrument(
    skip(self, instance, config, slot),
    fields(instance_id = %instance.instance_id, protocol = %instance.protocol, cycle_id = %Uuid::new_v4())
  )]
  async fn run_cycle(
    &self,
    instance: &MonitoredInstance,
    config: &SyncConfig,
    slot: &SyncSlot,
  ) -> CycleOutcome {
    let Some(_running) = CycleGuard::try_acquire(&slot.running) else {
      debug!("Previous cycle still in flight, skipping");
      let outcome = CycleOutcome::Skipped;
      self.telemetry.record_sync_cycle(instance, &outcome);
      return outcome;
    };

    let outcome = self.run_attempts(instance, config, slot).await;
    self.telemetry.record_sync_cycle(instance, &outcome);
    outcome
  }

  async fn run_attempts(
    &self,
    instance: &MonitoredInstance,
    config: &SyncConfig,
    slot: &SyncSlot,
  ) -> CycleOutcome {
    let policy = config.retry_policy();
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts() {
      match self.attempt(instance, config).await {
        Ok(records) => {
          let now = Utc::now();
          {
            let mut state = slot.state.write().await;
            state.last_sync_at = Some(now);
            if let Some(first) = records.first() {
              state.last_price = Some(first.price);
            }
            state.consecutive_errors = 0;
            state.last_error = None;
          }

          self
            .report(
              instance,
              SyncStateRecord {
                last_sync_at: Some(now),
                last_processed_block: records.iter().filter_map(|r| r.block_number).max(),
                status: SyncStatus::Healthy,
                error_message: None,
                updated_at: now,
              },
            )
            .await;

          info!(attempt, records = records.len(), "Sync cycle complete");
          return CycleOutcome::Synced {
            records: records.len(),
            attempts: attempt,
          };
        }
        Err(e) => {
          last_error = e.to_string();
          let consecutive_errors = {
            let mut state = slot.state.write().await;
            state.consecutive_errors += 1;
            state.last_error = Some(last_error.clone());
            state.consecutive_errors
          };

          self
            .report(
              instance,
              SyncStateRecord {
                last_sync_at: None,
                last_processed_block: None,
                status: SyncStatus::Error,
                error_message: Some(last_error.clone()),
                updated_at: Utc::now(),
              },
            )
            .await;

          if policy.should_retry(attempt) {
            let delay = policy.delay_for(attempt);
            warn!(
              attempt,
              consecutive_errors,
              delay_ms = delay.as_millis() as u64,
              error = %e,
              "Sync attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
          } else {
            error!(
              attempt,
              consecutive_errors,
              error = %e,
              "Sync retries exhausted, waiting for next tick"
            );
          }
        }
      }
    }

    CycleOutcome::Exhausted {
      attempts: policy.max_attempts(),
      last_error,
    }
  }

  /// Call the sync function once and write what it returns.
  async fn attempt(
    &self,
    instance: &MonitoredInstance,
    config: &SyncConfig,
  ) -> Result<Vec<PriceFeedRecord>> {
    let sync_fn = self.registry.sync_function(instance.protocol)?;
    let ctx = SyncContext {
      instance_id: instance.instance_id.clone(),
      protocol: instance.protocol,
      chain: instance.chain.clone(),
      rpc_url: instance.adapter_config.endpoint.clone(),
      adapter_config: instance.adapter_config.clone(),
      config: config.clone(),
    };

    let guarded = AssertUnwindSafe(sync_fn.sync(&ctx)).catch_unwind();
    let records = match maybe_with_timeout(guarded, config.adapter_timeout_ms, "sync function timed out").await? {
      Ok(Ok(records)) => records,
      Ok(Err(e)) => return Err(MonitorError::adapter(&e)),
      Err(_) => return Err(MonitorError::Adapter("sync function panicked".to_string())),
    };

    self
      .registry
      .price_writer()
      .write(&records)
      .await
      .map_err(|e| MonitorError::persistence(&e))?;

    Ok(records)
  }

  /// Persist the sync-state row; failures are logged only.
  async fn report(&self, instance: &MonitoredInstance, record: SyncStateRecord) {
    if let Err(e) = self
      .gateway
      .upsert_sync_state(&instance.instance_id, &record)
      .await
    {
      warn!(
        instance_id = %instance.instance_id,
        error = %format!("{e:#}"),
        "Failed to persist sync state"
      );
    }
  }
}
