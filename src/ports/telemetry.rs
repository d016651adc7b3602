//! Telemetry Port - Cycle and Check Observations
//!
//! Use cases report what happened; adapters decide how to export it.

use crate::domain::feed::MonitoredInstance;
use crate::domain::health::{FeedVerdict, HealthCheckResult};
use crate::domain::sync::CycleOutcome;

/// Receives one event per sync cycle and per feed check.
pub trait MonitorTelemetry: Send + Sync + 'static {
  fn record_sync_cycle(&self, instance: &MonitoredInstance, outcome: &CycleOutcome);

  fn record_health_check(&self, result: &HealthCheckResult, verdict: FeedVerdict);
}

/// Telemetry sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl MonitorTelemetry for NoopTelemetry {
  fn record_sync_cycle(&self, _instance: &MonitoredInstance, _outcome: &CycleOutcome) {}

  fn record_health_check(&self, _result: &HealthCheckResult, _verdict: FeedVerdict) {}
}
