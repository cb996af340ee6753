use serde::{Deserialize, Serialize};

/// Normalized measurements for one remote device.
///
/// Every measurement is optional; only fields present are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_l1_w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_l2_w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_l3_w: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_kwh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_import_kwh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_export_kwh: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_l1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_l2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_l3: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_l1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_l2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_l3: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_temperature_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_pct: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_energy_kwh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_limit_a: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_on: Option<bool>,
}

/// Overwrite `into` with `from` when `from` holds a value
fn take<T>(into: &mut Option<T>, from: Option<T>) {
    if from.is_some() {
        *into = from;
    }
}

impl Reading {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Self::default()
        }
    }

    /// Fold a newer reading for the same device into this one. Fields the
    /// newer reading carries win; everything else is kept.
    pub fn merge(&mut self, newer: Reading) {
        take(&mut self.power_w, newer.power_w);
        take(&mut self.power_l1_w, newer.power_l1_w);
        take(&mut self.power_l2_w, newer.power_l2_w);
        take(&mut self.power_l3_w, newer.power_l3_w);
        take(&mut self.energy_kwh, newer.energy_kwh);
        take(&mut self.energy_import_kwh, newer.energy_import_kwh);
        take(&mut self.energy_export_kwh, newer.energy_export_kwh);
        take(&mut self.voltage_l1, newer.voltage_l1);
        take(&mut self.voltage_l2, newer.voltage_l2);
        take(&mut self.voltage_l3, newer.voltage_l3);
        take(&mut self.current_l1, newer.current_l1);
        take(&mut self.current_l2, newer.current_l2);
        take(&mut self.current_l3, newer.current_l3);
        take(&mut self.temperature_c, newer.temperature_c);
        take(&mut self.target_temperature_c, newer.target_temperature_c);
        take(&mut self.humidity_pct, newer.humidity_pct);
        take(&mut self.session_energy_kwh, newer.session_energy_kwh);
        take(&mut self.charge_limit_a, newer.charge_limit_a);
        take(&mut self.is_on, newer.is_on);
    }

    /// True when at least one measurement is set
    pub fn has_measurements(&self) -> bool {
        *self != Self::new(self.device_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_keeps_fields_the_newer_reading_lacks() {
        let mut pending = Reading {
            power_w: Some(1200.0),
            voltage_l1: Some(231.0),
            ..Reading::new("remote-1")
        };
        pending.merge(Reading {
            power_w: Some(1800.0),
            is_on: Some(true),
            ..Reading::new("remote-1")
        });

        assert_eq!(pending.power_w, Some(1800.0));
        assert_eq!(pending.voltage_l1, Some(231.0));
        assert_eq!(pending.is_on, Some(true));
    }

    #[test]
    fn test_serializes_only_present_fields() {
        let reading = Reading {
            power_w: Some(1800.0),
            ..Reading::new("remote-42")
        };
        assert_eq!(
            serde_json::to_value(&reading).unwrap(),
            json!({"device_id": "remote-42", "power_w": 1800.0})
        );
    }

    #[test]
    fn test_has_measurements() {
        assert!(!Reading::new("remote-1").has_measurements());
        assert!(Reading {
            is_on: Some(false),
            ..Reading::new("remote-1")
        }
        .has_measurements());
    }
}
