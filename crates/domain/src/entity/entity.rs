use super::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";
pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_UNKNOWN: &str = "unknown";

pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";
pub const ATTR_DEVICE_CLASS: &str = "device_class";
pub const ATTR_UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";

/// Snapshot of one runtime entity: its id, raw state and attributes.
///
/// Display name, device class and unit live in the attribute map the way the
/// runtime reports them; the accessors below read them out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: EntityId,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    pub fn new(entity_id: EntityId, state: impl Into<String>) -> Self {
        Self {
            entity_id,
            state: state.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_name(self, name: &str) -> Self {
        self.with_attribute(ATTR_FRIENDLY_NAME, name)
    }

    pub fn with_device_class(self, device_class: &str) -> Self {
        self.with_attribute(ATTR_DEVICE_CLASS, device_class)
    }

    pub fn with_unit(self, unit: &str) -> Self {
        self.with_attribute(ATTR_UNIT_OF_MEASUREMENT, unit)
    }

    pub fn domain(&self) -> &str {
        self.entity_id.domain()
    }

    /// Friendly name if the runtime provides one, otherwise the entity id
    pub fn display_name(&self) -> &str {
        self.attribute_str(ATTR_FRIENDLY_NAME)
            .unwrap_or_else(|| self.entity_id.as_str())
    }

    pub fn device_class(&self) -> Option<&str> {
        self.attribute_str(ATTR_DEVICE_CLASS)
    }

    pub fn unit(&self) -> Option<&str> {
        self.attribute_str(ATTR_UNIT_OF_MEASUREMENT)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// State parsed as a number, if it is one
    pub fn numeric_state(&self) -> Option<f64> {
        self.state.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// `unavailable` / `unknown` states carry no measurement
    pub fn is_available(&self) -> bool {
        self.state != STATE_UNAVAILABLE && self.state != STATE_UNKNOWN
    }

    /// Lowercase id + friendly name, the text the keyword heuristics search
    pub fn search_text(&self) -> String {
        match self.attribute_str(ATTR_FRIENDLY_NAME) {
            Some(name) => format!("{} {}", self.entity_id.as_str(), name.to_lowercase()),
            None => self.entity_id.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    #[test]
    fn test_accessors() {
        let entity = Entity::new(id("sensor.han_power"), "1.5")
            .with_name("HAN Power")
            .with_device_class("power")
            .with_unit("kW");

        assert_eq!(entity.domain(), "sensor");
        assert_eq!(entity.display_name(), "HAN Power");
        assert_eq!(entity.device_class(), Some("power"));
        assert_eq!(entity.unit(), Some("kW"));
        assert_eq!(entity.numeric_state(), Some(1.5));
        assert_eq!(entity.search_text(), "sensor.han_power han power");
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let entity = Entity::new(id("switch.plug"), "on");
        assert_eq!(entity.display_name(), "switch.plug");
        assert_eq!(entity.search_text(), "switch.plug");
    }

    #[test]
    fn test_availability() {
        assert!(!Entity::new(id("sensor.a"), STATE_UNAVAILABLE).is_available());
        assert!(!Entity::new(id("sensor.a"), STATE_UNKNOWN).is_available());
        assert!(Entity::new(id("sensor.a"), "12").is_available());
    }

    #[test]
    fn test_numeric_state_rejects_text_and_nan() {
        assert_eq!(Entity::new(id("sensor.a"), "heat").numeric_state(), None);
        assert_eq!(Entity::new(id("sensor.a"), "NaN").numeric_state(), None);
    }

    #[test]
    fn test_attribute_f64_accepts_numeric_strings() {
        let entity = Entity::new(id("water_heater.wh"), "eco")
            .with_attribute("current_temperature", json!(62))
            .with_attribute("temperature", json!("65.5"));
        assert_eq!(entity.attribute_f64("current_temperature"), Some(62.0));
        assert_eq!(entity.attribute_f64("temperature"), Some(65.5));
        assert_eq!(entity.attribute_f64("missing"), None);
    }

    #[test]
    fn test_deserialize_snapshot_shape() {
        let entity: Entity = serde_json::from_value(json!({
            "entity_id": "sensor.wh_power",
            "state": "2000",
            "attributes": {"device_class": "power", "unit_of_measurement": "W"}
        }))
        .unwrap();
        assert_eq!(entity.numeric_state(), Some(2000.0));
        assert_eq!(entity.unit(), Some("W"));
    }
}
