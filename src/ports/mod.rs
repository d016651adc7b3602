//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the use cases require from the
//! outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `OracleAdapter` / `AdapterFactory`: opaque per-protocol capability
//! - `PersistenceGateway`: keyed upsert/read store
//! - `InstanceCatalog`: configured instances
//! - `SyncFunction` / `PriceWriter`: per-protocol sync and the shared sink
//! - `MonitorTelemetry`: cycle and check observations

pub mod catalog;
pub mod gateway;
pub mod oracle_adapter;
pub mod sync;
pub mod telemetry;
