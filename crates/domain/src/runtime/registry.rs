use crate::entity::{Entity, EntityId};
use serde::{Deserialize, Serialize};

/// Domains the discovery engine looks at. Everything else is ignored.
pub const SUPPORTED_DOMAINS: [&str; 7] = [
    "sensor",
    "water_heater",
    "switch",
    "climate",
    "number",
    "select",
    "input_boolean",
];

/// Descriptive metadata of a parent device in the runtime registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

/// Read access to the runtime's entity and device registries.
///
/// Lookups are synchronous: the runtime keeps its registries in memory.
#[cfg_attr(test, mockall::automock)]
pub trait EntityRegistry: Send + Sync {
    /// Parent device the entity belongs to, if any
    fn parent_device(&self, entity_id: &EntityId) -> Option<String>;

    fn device_info(&self, device_id: &str) -> Option<DeviceInfo>;

    /// Current snapshot of every entity in the given domain
    fn entities_in(&self, domain: &str) -> Vec<Entity>;

    /// Integration/platform that created the entity (e.g. `easee`, `tibber`)
    fn entity_platform(&self, entity_id: &EntityId) -> Option<String>;

    /// Current snapshot of a single entity
    fn state_of(&self, entity_id: &EntityId) -> Option<Entity>;
}
