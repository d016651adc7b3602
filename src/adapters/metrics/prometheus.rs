//! Prometheus Metrics Registry - Sync and Health Observability
//!
//! Registers and exposes Prometheus metrics on :9090. Covers sync cycle
//! outcomes, retry attempts, health verdicts, check latency and the
//! per-feed healthy gauge. Implements the `MonitorTelemetry` port.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::feed::MonitoredInstance;
use crate::domain::health::{FeedVerdict, HealthCheckResult};
use crate::domain::sync::CycleOutcome;
use crate::ports::telemetry::MonitorTelemetry;

/// Centralized Prometheus metrics for the monitor.
///
/// All metrics are named `oracle_monitor_*` and carry protocol and chain
/// labels for per-network filtering.
pub struct MetricsRegistry {
    registry: Registry,
    /// Sync cycles by outcome (synced, skipped, exhausted).
    pub sync_cycles: IntCounterVec,
    /// Sync attempts made, retries included.
    pub sync_attempts: IntCounterVec,
    /// Health checks by verdict (healthy, stale, error).
    pub health_checks: IntCounterVec,
    /// Adapter health-check latency in milliseconds.
    pub check_latency_ms: HistogramVec,
    /// Last verdict per feed (1 = healthy, 0 = unhealthy).
    pub feed_healthy: GaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let sync_cycles = IntCounterVec::new(
            Opts::new("oracle_monitor_sync_cycles_total", "Sync cycles by outcome"),
            &["protocol", "chain", "outcome"],
        )?;

        let sync_attempts = IntCounterVec::new(
            Opts::new(
                "oracle_monitor_sync_attempts_total",
                "Sync function invocations, retries included",
            ),
            &["protocol", "chain"],
        )?;

        let health_checks = IntCounterVec::new(
            Opts::new("oracle_monitor_health_checks_total", "Feed health checks by verdict"),
            &["protocol", "chain", "verdict"],
        )?;

        let check_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "oracle_monitor_check_latency_ms",
                "Feed health check latency in milliseconds",
            )
            .buckets(vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]),
            &["protocol", "chain"],
        )?;

        let feed_healthy = GaugeVec::new(
            Opts::new(
                "oracle_monitor_feed_healthy",
                "Last feed verdict (1=healthy, 0=unhealthy)",
            ),
            &["protocol", "chain", "feed_id"],
        )?;

        registry.register(Box::new(sync_cycles.clone()))?;
        registry.register(Box::new(sync_attempts.clone()))?;
        registry.register(Box::new(health_checks.clone()))?;
        registry.register(Box::new(check_latency_ms.clone()))?;
        registry.register(Box::new(feed_healthy.clone()))?;

        Ok(Self {
            registry,
            sync_cycles,
            sync_attempts,
            health_checks,
            check_latency_ms,
            feed_healthy,
        })
    }

    /// Encode every registered metric in the text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics = Arc::clone(&self);
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

impl MonitorTelemetry for MetricsRegistry {
    fn record_sync_cycle(&self, instance: &MonitoredInstance, outcome: &CycleOutcome) {
        let protocol = instance.protocol.as_str();
        self.sync_cycles
            .with_label_values(&[protocol, &instance.chain, outcome.label()])
            .inc();
        self.sync_attempts
            .with_label_values(&[protocol, &instance.chain])
            .inc_by(u64::from(outcome.attempts()));
    }

    fn record_health_check(&self, result: &HealthCheckResult, verdict: FeedVerdict) {
        let protocol = result.protocol.as_str();
        let verdict = match verdict {
            FeedVerdict::Healthy => "healthy",
            FeedVerdict::Stale => "stale",
            FeedVerdict::Error => "error",
        };
        self.health_checks
            .with_label_values(&[protocol, &result.chain, verdict])
            .inc();
        self.check_latency_ms
            .with_label_values(&[protocol, &result.chain])
            .observe(result.latency_ms as f64);
        self.feed_healthy
            .with_label_values(&[protocol, &result.chain, &result.feed_id])
            .set(if result.healthy { 1.0 } else { 0.0 });
    }
}
