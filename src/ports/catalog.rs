//! Instance Catalog Port - Read-only View of Configured Instances
//!
//! Instance lifecycle belongs to configuration management; the engine
//! only looks instances up by id.

use crate::domain::feed::MonitoredInstance;

/// Lookup of monitored instances.
pub trait InstanceCatalog: Send + Sync + 'static {
  /// Find an instance by id.
  fn get_instance(&self, instance_id: &str) -> Option<MonitoredInstance>;

  /// All known instances, in configuration order.
  fn list_instances(&self) -> Vec<MonitoredInstance>;
}
