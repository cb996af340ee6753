use super::classifier::EntityClassifier;
use super::rules::{ClassifierRules, METER_DEVICE_CLASSES};
use crate::device_type::DeviceType;
use crate::entity::{Entity, EntityId};
use crate::runtime::{DeviceInfo, EntityRegistry, SUPPORTED_DOMAINS};
use std::collections::{BTreeMap, HashSet};

/// How a cluster came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterKind {
    /// Entities sharing a parent device in the registry
    Parent,
    /// Orphans collapsed into one synthetic device of the given type
    Virtual(DeviceType),
    /// An orphan standing alone
    Single,
}

/// Entities believed to belong to one physical device
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCluster {
    pub group_id: String,
    pub kind: ClusterKind,
    pub entities: Vec<Entity>,
    pub device: Option<DeviceInfo>,
    /// Originating integrations of the member entities, first-seen order
    pub platforms: Vec<String>,
}

impl EntityCluster {
    fn new(group_id: impl Into<String>, kind: ClusterKind) -> Self {
        Self {
            group_id: group_id.into(),
            kind,
            entities: Vec::new(),
            device: None,
            platforms: Vec::new(),
        }
    }

    fn push(&mut self, entity: Entity, platform: Option<String>) {
        if let Some(platform) = platform {
            if !self.platforms.contains(&platform) {
                self.platforms.push(platform);
            }
        }
        self.entities.push(entity);
    }
}

/// Result of one grouping pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grouping {
    pub clusters: Vec<EntityCluster>,
    /// Parent devices skipped as helper controls for another device
    pub control_only: Vec<String>,
    /// Orphan switches with no device they could be attached to
    pub unassociated: Vec<EntityId>,
}

/// Partitions runtime entities into per-device clusters
#[derive(Debug, Clone, Default)]
pub struct DeviceGrouper {
    classifier: EntityClassifier,
}

impl DeviceGrouper {
    pub const VIRTUAL_POWER_METER: &'static str = "virtual_power_meter";
    pub const VIRTUAL_WATER_HEATER: &'static str = "virtual_water_heater";
    pub const VIRTUAL_EV_CHARGER: &'static str = "virtual_ev_charger";
    pub const VIRTUAL_CLIMATE: &'static str = "virtual_climate";

    pub fn new(rules: ClassifierRules) -> Self {
        Self {
            classifier: EntityClassifier::new(rules),
        }
    }

    /// Every entity in a supported domain, sorted by id
    pub fn collect_entities(registry: &dyn EntityRegistry) -> Vec<Entity> {
        let mut entities: Vec<Entity> = SUPPORTED_DOMAINS
            .iter()
            .flat_map(|domain| registry.entities_in(domain))
            .collect();
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entities.dedup_by(|a, b| a.entity_id == b.entity_id);
        entities
    }

    pub fn group(&self, registry: &dyn EntityRegistry, entities: Vec<Entity>) -> Grouping {
        let mut parents: BTreeMap<String, EntityCluster> = BTreeMap::new();
        let mut orphans = Vec::new();

        for entity in entities {
            if !SUPPORTED_DOMAINS.contains(&entity.domain()) {
                continue;
            }
            let platform = registry.entity_platform(&entity.entity_id);
            match registry.parent_device(&entity.entity_id) {
                Some(device_id) => parents
                    .entry(device_id.clone())
                    .or_insert_with(|| EntityCluster::new(device_id, ClusterKind::Parent))
                    .push(entity, platform),
                None => orphans.push((entity, platform)),
            }
        }

        let mut grouping = Grouping::default();

        for (device_id, mut cluster) in parents {
            if self.classifier.is_control_only(&cluster) {
                grouping.control_only.push(device_id);
                continue;
            }
            cluster.device = registry.device_info(&device_id);
            grouping.clusters.push(cluster);
        }

        let mut virtual_groups: BTreeMap<&'static str, EntityCluster> = BTreeMap::new();
        let mut singles = Vec::new();

        for (entity, platform) in orphans {
            let Some((group_id, device_type)) = self.virtual_group_of(&entity) else {
                if matches!(entity.domain(), "switch" | "input_boolean") {
                    grouping.unassociated.push(entity.entity_id);
                } else {
                    let mut single =
                        EntityCluster::new(entity.entity_id.as_str(), ClusterKind::Single);
                    single.push(entity, platform);
                    singles.push(single);
                }
                continue;
            };
            virtual_groups
                .entry(group_id)
                .or_insert_with(|| {
                    EntityCluster::new(group_id, ClusterKind::Virtual(device_type))
                })
                .push(entity, platform);
        }

        grouping.clusters.extend(virtual_groups.into_values());
        grouping.clusters.extend(singles);
        grouping
    }

    fn virtual_group_of(&self, entity: &Entity) -> Option<(&'static str, DeviceType)> {
        match entity.domain() {
            "sensor"
                if entity
                    .device_class()
                    .is_some_and(|class| METER_DEVICE_CLASSES.contains(&class)) =>
            {
                Some((Self::VIRTUAL_POWER_METER, DeviceType::PowerMeter))
            }
            "water_heater" => Some((Self::VIRTUAL_WATER_HEATER, DeviceType::WaterHeater)),
            "climate" => Some((Self::VIRTUAL_CLIMATE, DeviceType::Climate)),
            "switch" | "input_boolean" => {
                match ClassifierRules::keyword_type(&entity.search_text())? {
                    DeviceType::EvCharger => {
                        Some((Self::VIRTUAL_EV_CHARGER, DeviceType::EvCharger))
                    }
                    DeviceType::WaterHeater => {
                        Some((Self::VIRTUAL_WATER_HEATER, DeviceType::WaterHeater))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Entity that represents the device when a single reference is needed.
///
/// Among mapped entities: a power entity named "consumption" or "total",
/// else the first power entity, else the first mapped entity in cluster order.
/// Best effort; several matching entities resolve to the first in order.
pub fn select_primary(
    cluster: &EntityCluster,
    mapped: &HashSet<&EntityId>,
    classifier: &EntityClassifier,
) -> Option<EntityId> {
    let candidates: Vec<&Entity> = cluster
        .entities
        .iter()
        .filter(|e| mapped.contains(&e.entity_id))
        .collect();

    let is_power = |e: &Entity| classifier.capability_of(e).is_some_and(|c| c.is_power());
    let named_total = |e: &Entity| {
        let text = e.search_text();
        text.contains("consumption") || text.contains("total")
    };

    candidates
        .iter()
        .copied()
        .find(|e| is_power(e) && named_total(e))
        .or_else(|| candidates.iter().copied().find(|e| is_power(e)))
        .or_else(|| candidates.first().copied())
        .map(|e| e.entity_id.clone())
}
