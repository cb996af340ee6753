use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of physical device a cluster of entities represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    PowerMeter,
    WaterHeater,
    EvCharger,
    Switch,
    Climate,
    Sensor,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PowerMeter => "power_meter",
            Self::WaterHeater => "water_heater",
            Self::EvCharger => "ev_charger",
            Self::Switch => "switch",
            Self::Climate => "climate",
            Self::Sensor => "sensor",
        }
    }

    /// Human readable label, used to name virtual groups
    pub fn label(&self) -> &'static str {
        match self {
            Self::PowerMeter => "Power Meter",
            Self::WaterHeater => "Water Heater",
            Self::EvCharger => "EV Charger",
            Self::Switch => "Switch",
            Self::Climate => "Climate",
            Self::Sensor => "Sensor",
        }
    }
}

impl FromStr for DeviceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "power_meter" => Ok(Self::PowerMeter),
            "water_heater" => Ok(Self::WaterHeater),
            "ev_charger" => Ok(Self::EvCharger),
            "switch" => Ok(Self::Switch),
            "climate" => Ok(Self::Climate),
            "sensor" => Ok(Self::Sensor),
            other => Err(DomainError::UnknownDeviceType(other.to_string())),
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
