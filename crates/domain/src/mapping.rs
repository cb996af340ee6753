use crate::capability::Capability;
use crate::discovery::DiscoveredDevice;
use crate::entity::EntityId;
use crate::error::DomainError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Where one local entity lands on the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub remote_device_id: String,
    pub capability: Capability,
    pub local_group_id: String,
}

/// Mapping table published after a successful sync.
///
/// Built only from ids the backend echoed back; replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSnapshot {
    /// Local group id -> remote device id
    pub device_ids: BTreeMap<String, String>,
    /// Local entity id -> mapping
    pub entities: BTreeMap<EntityId, EntityMapping>,
}

impl MappingSnapshot {
    /// One entry per (capability, entity) of every device the backend
    /// returned a remote id for. Devices missing from `device_ids` are left out.
    pub fn build(devices: &[DiscoveredDevice], device_ids: BTreeMap<String, String>) -> Self {
        let mut entities = BTreeMap::new();
        for device in devices {
            let Some(remote_id) = device_ids.get(&device.group_id) else {
                continue;
            };
            for (capability, entity_id) in &device.entity_mapping {
                entities.insert(
                    entity_id.clone(),
                    EntityMapping {
                        remote_device_id: remote_id.clone(),
                        capability: *capability,
                        local_group_id: device.group_id.clone(),
                    },
                );
            }
        }
        Self {
            device_ids,
            entities,
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityMapping> {
        self.entities.get(entity_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn entity_ids(&self) -> HashSet<EntityId> {
        self.entities.keys().cloned().collect()
    }

    /// Remote device ids that currently have at least one mapped entity
    pub fn remote_ids(&self) -> HashSet<&str> {
        self.entities
            .values()
            .map(|m| m.remote_device_id.as_str())
            .collect()
    }

    /// Local entity supplying `capability` for a remote device
    pub fn entity_for(&self, remote_device_id: &str, capability: Capability) -> Option<&EntityId> {
        self.entities
            .iter()
            .find(|(_, m)| m.remote_device_id == remote_device_id && m.capability == capability)
            .map(|(id, _)| id)
    }
}

/// Receives every newly published mapping snapshot
#[async_trait]
pub trait MappingObserver: Send + Sync {
    async fn mappings_updated(
        &self,
        snapshot: Arc<MappingSnapshot>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Persistence for the last successfully synced mapping
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn load(&self) -> Result<Option<MappingSnapshot>, DomainError>;
    async fn save(&self, snapshot: &MappingSnapshot) -> Result<(), DomainError>;
}
