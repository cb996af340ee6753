use crate::device_type::DeviceType;
use serde::{Deserialize, Serialize};

/// Integration platforms whose entities identify the device type outright.
pub const PLATFORM_DEVICE_TYPES: &[(&str, DeviceType)] = &[
    ("easee", DeviceType::EvCharger),
    ("zaptec", DeviceType::EvCharger),
    ("wallbox", DeviceType::EvCharger),
    ("ocpp", DeviceType::EvCharger),
    ("go_echarger", DeviceType::EvCharger),
    ("tesla_wall_connector", DeviceType::EvCharger),
    ("ohme", DeviceType::EvCharger),
    ("hoiax", DeviceType::WaterHeater),
    ("oso_energy", DeviceType::WaterHeater),
    ("econet", DeviceType::WaterHeater),
    ("aosmith", DeviceType::WaterHeater),
    ("tibber", DeviceType::PowerMeter),
    ("amshan", DeviceType::PowerMeter),
    ("ams", DeviceType::PowerMeter),
    ("dsmr", DeviceType::PowerMeter),
    ("p1_monitor", DeviceType::PowerMeter),
    ("homewizard", DeviceType::PowerMeter),
];

/// Tokens strongly associated with one device type. Scored by occurrence
/// count; table order breaks ties.
pub const SIGNAL_KEYWORDS: &[(DeviceType, &[&str])] = &[
    (
        DeviceType::EvCharger,
        &[
            "session_energy",
            "charging_current",
            "charge_limit",
            "charger",
            "charging",
            "cable_lock",
            "wallbox",
            "evse",
        ],
    ),
    (
        DeviceType::WaterHeater,
        &[
            "tank",
            "legionella",
            "water_heater",
            "hot_water",
            "boiler",
            "varmtvann",
            "vvb",
        ],
    ),
    (
        DeviceType::PowerMeter,
        &[
            "obis",
            "phase",
            "_l1",
            "_l2",
            "_l3",
            "import",
            "export",
            "meter",
            "han_",
            "ams_",
            "accumulated",
            "reactive",
        ],
    ),
];

/// Minimum signal score for the scoring tier to be considered confident
pub const SIGNAL_THRESHOLD: usize = 2;

/// Plain substring keywords for the last-resort tier
pub const FALLBACK_KEYWORDS: &[(DeviceType, &[&str])] = &[
    (
        DeviceType::EvCharger,
        &[
            "ev charger",
            "ev_charger",
            "charger",
            "wallbox",
            "easee",
            "zaptec",
            "charging",
        ],
    ),
    (
        DeviceType::WaterHeater,
        &[
            "water heater",
            "water_heater",
            "waterheater",
            "boiler",
            "hot water",
            "varmtvann",
            "hoiax",
        ],
    ),
    (
        DeviceType::Climate,
        &["heat pump", "heat_pump", "thermostat", "hvac", "air condition"],
    ),
];

/// Domains that only ever carry controls, never measurements
pub const CONTROL_DOMAINS: [&str; 4] = ["switch", "input_boolean", "number", "select"];

/// Sensor device classes that belong to an electricity meter
pub const METER_DEVICE_CLASSES: [&str; 4] = ["power", "energy", "voltage", "current"];

/// Tunable parts of the discovery heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRules {
    /// Surface L1/L2/L3 capabilities; when false they are dropped
    #[serde(default = "default_include_phase_sensors")]
    pub include_phase_sensors: bool,

    /// Names marking a sensor-less cluster as helper controls for another device
    #[serde(default = "default_control_keywords")]
    pub control_keywords: Vec<String>,
}

fn default_include_phase_sensors() -> bool {
    true
}

fn default_control_keywords() -> Vec<String> {
    [
        "smart", "power", "enable", "ev", "water", "charger", "control", "boost", "mode",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            include_phase_sensors: default_include_phase_sensors(),
            control_keywords: default_control_keywords(),
        }
    }
}

impl ClassifierRules {
    pub fn platform_type(platform: &str) -> Option<DeviceType> {
        let platform = platform.to_lowercase();
        PLATFORM_DEVICE_TYPES
            .iter()
            .find(|(name, _)| *name == platform)
            .map(|(_, device_type)| *device_type)
    }

    /// First fallback keyword family found in `text`
    pub fn keyword_type(text: &str) -> Option<DeviceType> {
        FALLBACK_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(device_type, _)| *device_type)
    }

    /// True when a keyword appears as a whole word, or run of words, in `text`
    pub fn mentions_control_keyword(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        let text_words = words(&text);
        self.control_keywords.iter().any(|keyword| {
            let keyword = keyword.to_lowercase();
            let needle = words(&keyword);
            !needle.is_empty()
                && text_words
                    .windows(needle.len())
                    .any(|w| w == needle.as_slice())
        })
    }
}

/// Words split on `_`, `.`, spaces and any other non-alphanumeric separator
fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}
