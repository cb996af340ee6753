use std::sync::Arc;

use domain::discovery::{ClassifierRules, DeviceGrouper, DiscoveredDevice, EntityClassifier};
use domain::EntityRegistry;
use tracing::debug;

/// Runs one discovery pass over the runtime registry
pub struct DiscoveryEngine {
    registry: Arc<dyn EntityRegistry>,
    grouper: DeviceGrouper,
    classifier: EntityClassifier,
}

impl DiscoveryEngine {
    pub fn new(registry: Arc<dyn EntityRegistry>, rules: ClassifierRules) -> Self {
        Self {
            registry,
            grouper: DeviceGrouper::new(rules.clone()),
            classifier: EntityClassifier::new(rules),
        }
    }

    /// Group, classify and map every supported entity.
    ///
    /// Output order is stable for an unchanged runtime topology.
    pub fn discover(&self) -> Vec<DiscoveredDevice> {
        let registry = self.registry.as_ref();
        let entities = DeviceGrouper::collect_entities(registry);
        let entity_count = entities.len();
        let grouping = self.grouper.group(registry, entities);

        for device_id in &grouping.control_only {
            debug!(device_id = %device_id, "Skipping control-only device");
        }
        for entity_id in &grouping.unassociated {
            debug!(entity_id = %entity_id, "Skipping orphan switch without an associated device");
        }

        let devices: Vec<DiscoveredDevice> = grouping
            .clusters
            .iter()
            .filter_map(|cluster| {
                let device = DiscoveredDevice::from_cluster(cluster, &self.classifier);
                if device.is_none() {
                    debug!(group_id = %cluster.group_id, "Dropping cluster without capabilities");
                }
                device
            })
            .collect();

        debug!(
            entities = entity_count,
            devices = devices.len(),
            "Discovery pass finished"
        );
        devices
    }
}
