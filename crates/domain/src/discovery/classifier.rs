use super::grouper::EntityCluster;
use super::rules::{ClassifierRules, CONTROL_DOMAINS, SIGNAL_KEYWORDS, SIGNAL_THRESHOLD};
use crate::capability::Capability;
use crate::device_type::DeviceType;
use crate::entity::{EntityId, Entity};
use std::collections::BTreeMap;

/// One classification tier. Returns `None` to defer to the next tier.
type Strategy = fn(&EntityClassifier, &EntityCluster) -> Option<DeviceType>;

/// Determines device type and per-entity capabilities for an entity cluster
#[derive(Debug, Clone, Default)]
pub struct EntityClassifier {
    rules: ClassifierRules,
}

/// Capabilities extracted from a cluster, first entity wins per capability
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedCapabilities {
    pub capabilities: Vec<Capability>,
    pub entity_mapping: BTreeMap<Capability, EntityId>,
}

impl ExtractedCapabilities {
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl EntityClassifier {
    const STRATEGIES: [Strategy; 3] = [
        Self::by_platform,
        Self::by_signal_score,
        Self::by_fallback,
    ];

    pub fn new(rules: ClassifierRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ClassifierRules {
        &self.rules
    }

    pub fn classify(&self, cluster: &EntityCluster) -> DeviceType {
        Self::STRATEGIES
            .iter()
            .find_map(|strategy| strategy(self, cluster))
            .unwrap_or(DeviceType::Sensor)
    }

    /// Capability an entity supplies, if any
    pub fn capability_of(&self, entity: &Entity) -> Option<Capability> {
        let capability = match entity.domain() {
            "sensor" => self.sensor_capability(entity),
            "water_heater" | "climate" => Some(Capability::Temperature),
            "switch" | "input_boolean" => Some(Capability::OnOff),
            "number" => number_capability(entity),
            _ => None,
        }?;

        if capability.is_phase_specific() && !self.rules.include_phase_sensors {
            return None;
        }
        Some(capability)
    }

    /// Walk the cluster in order and keep the first entity per capability
    pub fn extract(&self, cluster: &EntityCluster) -> ExtractedCapabilities {
        let mut extracted = ExtractedCapabilities::default();
        for entity in &cluster.entities {
            let Some(capability) = self.capability_of(entity) else {
                continue;
            };
            if extracted.entity_mapping.contains_key(&capability) {
                continue;
            }
            extracted.capabilities.push(capability);
            extracted
                .entity_mapping
                .insert(capability, entity.entity_id.clone());
        }
        extracted
    }

    /// Sensor-less cluster made of controls only and named like a helper
    pub fn is_control_only(&self, cluster: &EntityCluster) -> bool {
        if cluster.entities.is_empty() {
            return false;
        }
        let has_sensor = cluster.entities.iter().any(|e| e.domain() == "sensor");
        let all_controls = cluster
            .entities
            .iter()
            .all(|e| CONTROL_DOMAINS.contains(&e.domain()));
        let named_like_control = cluster
            .entities
            .iter()
            .any(|e| self.rules.mentions_control_keyword(&e.search_text()));

        !has_sensor && all_controls && named_like_control
    }

    fn sensor_capability(&self, entity: &Entity) -> Option<Capability> {
        let text = entity.search_text();
        match entity.device_class()? {
            "power" => Some(with_phase(Capability::Power, &text)),
            "energy" => Some(if text.contains("session") {
                Capability::SessionEnergy
            } else if text.contains("export") {
                Capability::EnergyExport
            } else if text.contains("import") {
                Capability::EnergyImport
            } else {
                Capability::Energy
            }),
            "voltage" => Some(with_phase(Capability::Voltage, &text)),
            "current" => Some(with_phase(Capability::Current, &text)),
            "temperature" => Some(Capability::Temperature),
            "humidity" => Some(Capability::Humidity),
            _ => None,
        }
    }

    fn by_platform(&self, cluster: &EntityCluster) -> Option<DeviceType> {
        cluster
            .platforms
            .iter()
            .find_map(|p| ClassifierRules::platform_type(p))
    }

    fn by_signal_score(&self, cluster: &EntityCluster) -> Option<DeviceType> {
        let blob = cluster
            .entities
            .iter()
            .map(Entity::search_text)
            .collect::<Vec<_>>()
            .join(" ");

        let mut best: Option<(DeviceType, usize)> = None;
        for (device_type, keywords) in SIGNAL_KEYWORDS {
            let score: usize = keywords.iter().map(|k| blob.matches(k).count()).sum();
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((*device_type, score));
            }
        }

        best.filter(|(_, score)| *score >= SIGNAL_THRESHOLD)
            .map(|(device_type, _)| device_type)
    }

    fn by_fallback(&self, cluster: &EntityCluster) -> Option<DeviceType> {
        let has_domain = |domain: &str| cluster.entities.iter().any(|e| e.domain() == domain);

        if has_domain("water_heater") {
            return Some(DeviceType::WaterHeater);
        }
        if has_domain("climate") {
            return Some(DeviceType::Climate);
        }

        let mut text = String::new();
        if let Some(device) = &cluster.device {
            for part in [&device.name, &device.manufacturer].into_iter().flatten() {
                text.push_str(&part.to_lowercase());
                text.push(' ');
            }
        }
        for entity in &cluster.entities {
            text.push_str(&entity.search_text());
            text.push(' ');
        }
        if let Some(device_type) = ClassifierRules::keyword_type(&text) {
            return Some(device_type);
        }

        if has_domain("switch") || has_domain("input_boolean") {
            return Some(DeviceType::Switch);
        }

        let metered = cluster
            .entities
            .iter()
            .filter_map(|e| self.capability_of(e))
            .any(|c| c.is_power() || c.is_energy());
        Some(if metered {
            DeviceType::PowerMeter
        } else {
            DeviceType::Sensor
        })
    }
}

fn number_capability(entity: &Entity) -> Option<Capability> {
    let text = entity.search_text();
    let named = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if named(&[
        "charge_limit",
        "charge limit",
        "charging_current",
        "charging current",
        "max_current",
        "current_limit",
    ]) {
        Some(Capability::ChargeLimit)
    } else if named(&["target_temperature", "target temperature", "setpoint"]) {
        Some(Capability::TargetTemperature)
    } else {
        None
    }
}

fn with_phase(capability: Capability, text: &str) -> Capability {
    match phase_of(text) {
        Some(phase) => capability.on_phase(phase),
        None => capability,
    }
}

/// Phase number named by `l1`..`l3`, `phase1`..`phase3` or `phase 1`..`phase 3`
pub(crate) fn phase_of(text: &str) -> Option<u8> {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let digit = |s: &str| match s {
        "1" => Some(1),
        "2" => Some(2),
        "3" => Some(3),
        _ => None,
    };

    for (i, token) in tokens.iter().enumerate() {
        if let Some(n) = token.strip_prefix('l').and_then(digit) {
            return Some(n);
        }
        if let Some(rest) = token.strip_prefix("phase") {
            if let Some(n) = digit(rest) {
                return Some(n);
            }
            if rest.is_empty() {
                if let Some(n) = tokens.get(i + 1).and_then(|next| digit(next)) {
                    return Some(n);
                }
            }
        }
    }
    None
}
