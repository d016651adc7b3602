//! Config Catalog - Instances Loaded from `config.toml`

use crate::domain::feed::MonitoredInstance;
use crate::ports::catalog::InstanceCatalog;

/// Fixed set of instances, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ConfigCatalog {
  instances: Vec<MonitoredInstance>,
}

impl ConfigCatalog {
  pub fn new(instances: Vec<MonitoredInstance>) -> Self {
    Self { instances }
  }
}

impl InstanceCatalog for ConfigCatalog {
  fn get_instance(&self, instance_id: &str) -> Option<MonitoredInstance> {
    self
      .instances
      .iter()
      .find(|i| i.instance_id == instance_id)
      .cloned()
  }

  fn list_instances(&self) -> Vec<MonitoredInstance> {
    self.instances.clone()
  }
}
