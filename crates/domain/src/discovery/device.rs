use super::classifier::EntityClassifier;
use super::grouper::{select_primary, ClusterKind, EntityCluster};
use crate::backend::DeviceRecord;
use crate::capability::Capability;
use crate::device_type::DeviceType;
use crate::entity::EntityId;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// One logical physical device found by a discovery pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    pub group_id: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub device_type: DeviceType,
    /// Distinct capabilities, in the order their entities were found
    pub capabilities: Vec<Capability>,
    pub entity_mapping: BTreeMap<Capability, EntityId>,
    pub primary_entity_id: EntityId,
}

impl DiscoveredDevice {
    /// Classify a cluster into a device. Returns `None` when no member
    /// entity supplies a capability.
    pub fn from_cluster(cluster: &EntityCluster, classifier: &EntityClassifier) -> Option<Self> {
        let extracted = classifier.extract(cluster);
        if extracted.is_empty() {
            return None;
        }

        let device_type = classifier.classify(cluster);
        let mapped: HashSet<&EntityId> = extracted.entity_mapping.values().collect();
        let primary_entity_id = select_primary(cluster, &mapped, classifier)?;

        let info = cluster.device.clone().unwrap_or_default();
        let name = info.name.clone().unwrap_or_else(|| match cluster.kind {
            ClusterKind::Virtual(virtual_type) => virtual_type.label().to_string(),
            ClusterKind::Parent | ClusterKind::Single => cluster
                .entities
                .iter()
                .find(|e| e.entity_id == primary_entity_id)
                .map(|e| e.display_name().to_string())
                .unwrap_or_else(|| primary_entity_id.to_string()),
        });

        Some(Self {
            group_id: cluster.group_id.clone(),
            name,
            manufacturer: info.manufacturer,
            model: info.model,
            device_type,
            capabilities: extracted.capabilities,
            entity_mapping: extracted.entity_mapping,
            primary_entity_id,
        })
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entity_mapping.values()
    }

    /// Selected by group id, by primary entity, or by any mapped entity id
    /// (older selections were made per entity).
    pub fn matches_selection(&self, selected: &HashSet<String>) -> bool {
        selected.contains(&self.group_id)
            || selected.contains(self.primary_entity_id.as_str())
            || self.entity_ids().any(|id| selected.contains(id.as_str()))
    }

    /// Wire representation sent to the backend
    pub fn to_record(&self) -> DeviceRecord {
        DeviceRecord {
            ha_device_id: self.group_id.clone(),
            device_type: self.device_type,
            name: self.name.clone(),
            capabilities: self.capabilities.clone(),
            entity_mapping: self.entity_mapping.clone(),
            primary_entity_id: self.primary_entity_id.clone(),
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
        }
    }
}
