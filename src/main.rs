//! Oracle Feed Monitor - Entry Point
//!
//! Initializes configuration, logging, persistence and the two
//! scheduling engines. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Open the file gateway (replays JSONL logs and sync snapshot)
//! 4. Build the protocol registry (HTTP adapter per configured protocol)
//! 5. Spawn metrics server (:9090) and health server (/live + /ready)
//! 6. Start every instance sync and every derived health monitor
//! 7. Probe the store periodically for readiness
//! 8. Wait for SIGINT → graceful shutdown (stop timers → not ready → exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use oracle_feed_monitor::adapters::catalog::ConfigCatalog;
use oracle_feed_monitor::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use oracle_feed_monitor::adapters::oracles::HttpAdapterFactory;
use oracle_feed_monitor::adapters::persistence::FileGateway;
use oracle_feed_monitor::config::{self, AppConfig};
use oracle_feed_monitor::ports::gateway::PersistenceGateway;
use oracle_feed_monitor::ports::telemetry::{MonitorTelemetry, NoopTelemetry};
use oracle_feed_monitor::usecases::{HealthMonitor, ProtocolRegistry, SyncScheduler};

/// How often readiness re-probes the store.
const STORE_PROBE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        instances = config.instances.len(),
        "Starting oracle feed monitor"
    );

    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 3. Persistence gateway ──────────────────────────────
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(
        FileGateway::open(&config.persistence.data_dir)
            .await
            .context("Failed to open persistence gateway")?,
    );

    // ── 4. Protocol registry ────────────────────────────────
    let registry = Arc::new(build_registry(&config, Arc::clone(&gateway)));

    // ── 5. Observability servers ────────────────────────────
    let health_state = Arc::new(HealthState::new());
    let telemetry: Arc<dyn MonitorTelemetry> = if config.metrics.enabled {
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics")?);
        let serving = Arc::clone(&metrics);
        let bind_address = config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = serving.serve(bind_address, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        });
        metrics
    } else {
        Arc::new(NoopTelemetry)
    };

    let health_server = HealthServer::new(Arc::clone(&health_state), config.metrics.health_port);
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    // ── 6. Engines ──────────────────────────────────────────
    let catalog = Arc::new(ConfigCatalog::new(config.instances.clone()));
    let scheduler = SyncScheduler::new(
        Arc::clone(&registry),
        catalog,
        Arc::clone(&gateway),
        config.sync.clone(),
        Arc::clone(&telemetry),
    );
    let monitor = HealthMonitor::new(
        Arc::clone(&registry),
        Arc::clone(&gateway),
        config.health.clone(),
        telemetry,
    );

    start_engines(&config, &scheduler, &monitor).await;
    health_state.set_engine_running(true);

    // ── 7. Store readiness probe ────────────────────────────
    let probe_state = Arc::clone(&health_state);
    let probe_gateway = Arc::clone(&gateway);
    let mut probe_shutdown = shutdown_tx.subscribe();
    let probe_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STORE_PROBE_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = probe_shutdown.recv() => break,
                _ = ticker.tick() => {
                    let healthy = probe_gateway.is_healthy().await;
                    if !healthy {
                        warn!("Persistence gateway probe failed");
                    }
                    probe_state.set_store_healthy(healthy);
                }
            }
        }
    });

    info!(
        syncs = scheduler.get_running_syncs().await.len(),
        monitors = monitor.get_active_monitors().await.len(),
        "Monitor is running"
    );

    // ── 8. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    health_state.set_engine_running(false);
    let syncs = scheduler.stop_all_syncs().await;
    let monitors = monitor.stop_all_monitoring().await;
    info!(syncs, monitors, "Timers cancelled");

    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), probe_handle).await;

    info!("Shutdown complete");
    Ok(())
}

/// Register the HTTP adapter for every protocol named in the configuration.
fn build_registry(config: &AppConfig, gateway: Arc<dyn PersistenceGateway>) -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new(gateway);
    let protocols: BTreeSet<_> = config.instances.iter().map(|i| i.protocol).collect();
    for protocol in protocols {
        registry.register_protocol(protocol, Arc::new(HttpAdapterFactory::new(protocol)));
    }
    registry
}

/// Start every configured sync and monitor. Setup errors are logged, not fatal.
async fn start_engines(config: &AppConfig, scheduler: &SyncScheduler, monitor: &HealthMonitor) {
    for instance in &config.instances {
        if let Err(e) = scheduler.start_sync(&instance.instance_id, None).await {
            error!(instance_id = %instance.instance_id, error = %e, "Failed to start sync");
        }
    }

    for target in config.monitor_targets() {
        if let Err(e) = monitor
            .start_monitoring(target.protocol, &target.chain, target.feed_ids, target.adapter_config)
            .await
        {
            error!(
                protocol = %target.protocol,
                chain = %target.chain,
                error = %e,
                "Failed to start monitoring"
            );
        }
    }
}
