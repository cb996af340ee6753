use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A measurable or controllable facet a device exposes.
///
/// The declaration order is the canonical ordering used by maps keyed by
/// capability, so wire output stays stable across discovery passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Power,
    #[serde(rename = "power_l1")]
    PowerL1,
    #[serde(rename = "power_l2")]
    PowerL2,
    #[serde(rename = "power_l3")]
    PowerL3,
    Energy,
    EnergyImport,
    EnergyExport,
    Voltage,
    #[serde(rename = "voltage_l1")]
    VoltageL1,
    #[serde(rename = "voltage_l2")]
    VoltageL2,
    #[serde(rename = "voltage_l3")]
    VoltageL3,
    Current,
    #[serde(rename = "current_l1")]
    CurrentL1,
    #[serde(rename = "current_l2")]
    CurrentL2,
    #[serde(rename = "current_l3")]
    CurrentL3,
    Temperature,
    TargetTemperature,
    OnOff,
    Humidity,
    ChargeLimit,
    SessionEnergy,
}

impl Capability {
    pub const ALL: [Capability; 21] = [
        Self::Power,
        Self::PowerL1,
        Self::PowerL2,
        Self::PowerL3,
        Self::Energy,
        Self::EnergyImport,
        Self::EnergyExport,
        Self::Voltage,
        Self::VoltageL1,
        Self::VoltageL2,
        Self::VoltageL3,
        Self::Current,
        Self::CurrentL1,
        Self::CurrentL2,
        Self::CurrentL3,
        Self::Temperature,
        Self::TargetTemperature,
        Self::OnOff,
        Self::Humidity,
        Self::ChargeLimit,
        Self::SessionEnergy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::PowerL1 => "power_l1",
            Self::PowerL2 => "power_l2",
            Self::PowerL3 => "power_l3",
            Self::Energy => "energy",
            Self::EnergyImport => "energy_import",
            Self::EnergyExport => "energy_export",
            Self::Voltage => "voltage",
            Self::VoltageL1 => "voltage_l1",
            Self::VoltageL2 => "voltage_l2",
            Self::VoltageL3 => "voltage_l3",
            Self::Current => "current",
            Self::CurrentL1 => "current_l1",
            Self::CurrentL2 => "current_l2",
            Self::CurrentL3 => "current_l3",
            Self::Temperature => "temperature",
            Self::TargetTemperature => "target_temperature",
            Self::OnOff => "on_off",
            Self::Humidity => "humidity",
            Self::ChargeLimit => "charge_limit",
            Self::SessionEnergy => "session_energy",
        }
    }

    /// Power in any form (total or per phase)
    pub fn is_power(&self) -> bool {
        matches!(
            self,
            Self::Power | Self::PowerL1 | Self::PowerL2 | Self::PowerL3
        )
    }

    /// Accumulated energy of any kind
    pub fn is_energy(&self) -> bool {
        matches!(
            self,
            Self::Energy | Self::EnergyImport | Self::EnergyExport | Self::SessionEnergy
        )
    }

    /// Capabilities bound to a single electrical phase
    pub fn is_phase_specific(&self) -> bool {
        self.phase().is_some()
    }

    pub fn phase(&self) -> Option<u8> {
        match self {
            Self::PowerL1 | Self::VoltageL1 | Self::CurrentL1 => Some(1),
            Self::PowerL2 | Self::VoltageL2 | Self::CurrentL2 => Some(2),
            Self::PowerL3 | Self::VoltageL3 | Self::CurrentL3 => Some(3),
            _ => None,
        }
    }

    /// Phase-specific variant of power, voltage or current.
    /// Other capabilities (and unknown phases) are returned unchanged.
    pub fn on_phase(self, phase: u8) -> Self {
        match (self, phase) {
            (Self::Power, 1) => Self::PowerL1,
            (Self::Power, 2) => Self::PowerL2,
            (Self::Power, 3) => Self::PowerL3,
            (Self::Voltage, 1) => Self::VoltageL1,
            (Self::Voltage, 2) => Self::VoltageL2,
            (Self::Voltage, 3) => Self::VoltageL3,
            (Self::Current, 1) => Self::CurrentL1,
            (Self::Current, 2) => Self::CurrentL2,
            (Self::Current, 3) => Self::CurrentL3,
            (other, _) => other,
        }
    }
}

impl FromStr for Capability {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DomainError::UnknownCapability(s.to_string()))
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
