//! Protocol Registry - Typed Protocol → Implementation Table
//!
//! Wired once at process start, then shared read-only by the scheduler
//! and the monitor:
//! - protocol → sync function
//! - protocol → adapter factory (adapters built lazily, then cached)
//! - one price writer for every protocol (gateway-backed by default)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::feed::{AdapterConfig, PriceFeedRecord, Protocol};
use crate::error::{MonitorError, Result};
use crate::ports::gateway::PersistenceGateway;
use crate::ports::oracle_adapter::{AdapterFactory, OracleAdapter};
use crate::ports::sync::{PriceWriter, SyncFunction};

use super::adapter_sync::AdapterSyncFunction;

/// Default sink: upsert straight into the persistence gateway.
pub struct GatewayPriceWriter {
  gateway: Arc<dyn PersistenceGateway>,
}

impl GatewayPriceWriter {
  pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
    Self { gateway }
  }
}

#[async_trait]
impl PriceWriter for GatewayPriceWriter {
  async fn write(&self, records: &[PriceFeedRecord]) -> anyhow::Result<()> {
    if records.is_empty() {
      return Ok(());
    }
    self.gateway.upsert_price_feeds(records).await
  }
}

/// Lazily built adapters keyed by protocol, chain and endpoint.
///
/// One cache per registry, shared with the default sync functions so sync
/// cycles and health checks reuse the same adapter per endpoint.
#[derive(Default)]
pub struct AdapterCache {
  adapters: RwLock<HashMap<String, Arc<dyn OracleAdapter>>>,
}

impl AdapterCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return the cached adapter or build one with `factory`.
  pub async fn get_or_create(
    &self,
    factory: &dyn AdapterFactory,
    protocol: Protocol,
    chain: &str,
    config: &AdapterConfig,
  ) -> Result<Arc<dyn OracleAdapter>> {
    let key = format!("{protocol}-{chain}-{}", config.endpoint);

    if let Some(adapter) = self.adapters.read().await.get(&key) {
      return Ok(Arc::clone(adapter));
    }

    let mut guard = self.adapters.write().await;
    if let Some(adapter) = guard.get(&key) {
      return Ok(Arc::clone(adapter));
    }

    let adapter = factory
      .create(chain, config)
      .map_err(|e| MonitorError::adapter(&e))?;
    debug!(%protocol, chain, endpoint = %config.endpoint, "Adapter created");
    guard.insert(key, Arc::clone(&adapter));
    Ok(adapter)
  }

  /// Number of adapters built so far.
  pub async fn len(&self) -> usize {
    self.adapters.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.len().await == 0
  }
}

/// Process-wide protocol wiring.
pub struct ProtocolRegistry {
  sync_functions: HashMap<Protocol, Arc<dyn SyncFunction>>,
  adapter_factories: HashMap<Protocol, Arc<dyn AdapterFactory>>,
  price_writer: Arc<dyn PriceWriter>,
  adapters: Arc<AdapterCache>,
}

impl ProtocolRegistry {
  /// Create an empty registry whose price writer targets `gateway`.
  pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
    Self {
      sync_functions: HashMap::new(),
      adapter_factories: HashMap::new(),
      price_writer: Arc::new(GatewayPriceWriter::new(gateway)),
      adapters: Arc::new(AdapterCache::new()),
    }
  }

  /// Associate a protocol with its sync function. Replaces any previous one.
  pub fn register_sync_function(&mut self, protocol: Protocol, sync_fn: Arc<dyn SyncFunction>) {
    info!(%protocol, "Sync function registered");
    self.sync_functions.insert(protocol, sync_fn);
  }

  /// Replace the shared price writer.
  pub fn register_price_writer(&mut self, writer: Arc<dyn PriceWriter>) {
    info!("Price writer registered");
    self.price_writer = writer;
  }

  /// Associate a protocol with its adapter factory.
  pub fn register_adapter_factory(&mut self, protocol: Protocol, factory: Arc<dyn AdapterFactory>) {
    info!(%protocol, "Adapter factory registered");
    self.adapter_factories.insert(protocol, factory);
  }

  /// Register a factory and the default adapter-backed sync function.
  pub fn register_protocol(&mut self, protocol: Protocol, factory: Arc<dyn AdapterFactory>) {
    let sync_fn =
      AdapterSyncFunction::new(protocol, Arc::clone(&factory), Arc::clone(&self.adapters));
    self.register_adapter_factory(protocol, factory);
    self.register_sync_function(protocol, Arc::new(sync_fn));
  }

  /// Sync function of a protocol.
  pub fn sync_function(&self, protocol: Protocol) -> Result<Arc<dyn SyncFunction>> {
    self
      .sync_functions
      .get(&protocol)
      .cloned()
      .ok_or(MonitorError::UnregisteredProtocol {
        protocol,
        kind: "sync function",
      })
  }

  /// Fail unless an adapter factory exists for the protocol.
  pub fn ensure_adapter_factory(&self, protocol: Protocol) -> Result<()> {
    if self.adapter_factories.contains_key(&protocol) {
      Ok(())
    } else {
      Err(MonitorError::UnregisteredProtocol {
        protocol,
        kind: "adapter factory",
      })
    }
  }

  /// The shared price writer.
  pub fn price_writer(&self) -> Arc<dyn PriceWriter> {
    Arc::clone(&self.price_writer)
  }

  /// Resolve (building on first use) the adapter for a protocol and chain.
  pub async fn resolve_adapter(
    &self,
    protocol: Protocol,
    chain: &str,
    config: &AdapterConfig,
  ) -> Result<Arc<dyn OracleAdapter>> {
    let factory = self
      .adapter_factories
      .get(&protocol)
      .ok_or(MonitorError::UnregisteredProtocol {
        protocol,
        kind: "adapter factory",
      })?;
    self
      .adapters
      .get_or_create(factory.as_ref(), protocol, chain, config)
      .await
  }

  /// Protocols with a sync function, sorted.
  pub fn registered_protocols(&self) -> Vec<Protocol> {
    let mut protocols: Vec<_> = self.sync_functions.keys().copied().collect();
    protocols.sort();
    protocols
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use chrono::Utc;

  use super::*;
  use crate::adapters::persistence::MemoryGateway;
  use crate::config::SyncConfig;
  use crate::domain::feed::{FeedSpec, Reading};
  use crate::ports::sync::SyncContext;

  struct FixedAdapter;

  #[async_trait]
  impl OracleAdapter for FixedAdapter {
    async fn fetch_price(&self, _feed_id: &str) -> anyhow::Result<Reading> {
      Ok(Reading {
        value: 1.0,
        origin_timestamp: Utc::now(),
        block_number: None,
        confidence: None,
      })
    }
  }

  #[derive(Default)]
  struct CountingFactory {
    built: AtomicUsize,
  }

  impl AdapterFactory for CountingFactory {
    fn create(&self, _chain: &str, _config: &AdapterConfig) -> anyhow::Result<Arc<dyn OracleAdapter>> {
      self.built.fetch_add(1, Ordering::SeqCst);
      Ok(Arc::new(FixedAdapter))
    }
  }

  fn registry() -> ProtocolRegistry {
    ProtocolRegistry::new(Arc::new(MemoryGateway::new()))
  }

  #[test]
  fn test_unregistered_protocol_errors() {
    let registry = registry();
    assert!(matches!(
      registry.sync_function(Protocol::Pyth),
      Err(MonitorError::UnregisteredProtocol { protocol: Protocol::Pyth, .. })
    ));
    assert!(registry.ensure_adapter_factory(Protocol::Pyth).is_err());
  }

  #[tokio::test]
  async fn test_adapters_built_once_per_endpoint() {
    let factory = Arc::new(CountingFactory::default());
    let mut registry = registry();
    registry.register_protocol(Protocol::Chainlink, Arc::clone(&factory) as Arc<dyn AdapterFactory>);

    let config = AdapterConfig {
      endpoint: "http://node-a".to_string(),
      ..AdapterConfig::default()
    };
    for _ in 0..3 {
      registry
        .resolve_adapter(Protocol::Chainlink, "ethereum", &config)
        .await
        .unwrap();
    }
    assert_eq!(factory.built.load(Ordering::SeqCst), 1);

    let other = AdapterConfig {
      endpoint: "http://node-b".to_string(),
      ..AdapterConfig::default()
    };
    registry
      .resolve_adapter(Protocol::Chainlink, "ethereum", &other)
      .await
      .unwrap();
    assert_eq!(factory.built.load(Ordering::SeqCst), 2);
    assert_eq!(registry.registered_protocols(), vec![Protocol::Chainlink]);
  }

  #[tokio::test]
  async fn test_sync_function_shares_the_registry_adapter() {
    let factory = Arc::new(CountingFactory::default());
    let mut registry = registry();
    registry.register_protocol(Protocol::Chainlink, Arc::clone(&factory) as Arc<dyn AdapterFactory>);

    let adapter_config = AdapterConfig {
      endpoint: "http://node-a".to_string(),
      feeds: vec![FeedSpec {
        symbol: "ETH/USD".to_string(),
        feed_id: None,
      }],
      ..AdapterConfig::default()
    };
    let ctx = SyncContext {
      instance_id: "chainlink-eth".to_string(),
      protocol: Protocol::Chainlink,
      chain: "ethereum".to_string(),
      rpc_url: "http://node-a".to_string(),
      adapter_config: adapter_config.clone(),
      config: SyncConfig::default(),
    };

    let sync_fn = registry.sync_function(Protocol::Chainlink).unwrap();
    let records = sync_fn.sync(&ctx).await.unwrap();
    assert_eq!(records.len(), 1);

    registry
      .resolve_adapter(Protocol::Chainlink, "ethereum", &adapter_config)
      .await
      .unwrap();
    assert_eq!(factory.built.load(Ordering::SeqCst), 1);
  }
}
