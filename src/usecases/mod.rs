//! Use Cases Layer - Scheduling and Health Workflows
//!
//! Orchestrates domain logic with port interfaces. Each started unit
//! (instance for sync, protocol-chain for health) owns one tokio task.
//!
//! Use cases:
//! - `ProtocolRegistry`: protocol → sync function / adapter factory, price writer
//! - `SyncScheduler`: recurring sync cycles with bounded retries
//! - `HealthMonitor`: batched feed health checks and summaries
//! - `AdapterSyncFunction`: default reading → record conversion

pub mod adapter_sync;
pub mod guard;
pub mod health_monitor;
pub mod registry;
pub mod retry;
pub mod sync_scheduler;

pub use adapter_sync::AdapterSyncFunction;
pub use health_monitor::HealthMonitor;
pub use registry::{GatewayPriceWriter, ProtocolRegistry};
pub use retry::{BackoffStrategy, RetryPolicy, with_timeout};
pub use sync_scheduler::SyncScheduler;
