use super::units::{to_kilowatt_hours, to_watts};
use super::Reading;
use crate::capability::Capability;
use crate::entity::{Entity, STATE_OFF, STATE_ON};
use crate::mapping::EntityMapping;

const ATTR_CURRENT_TEMPERATURE: &str = "current_temperature";
const ATTR_TARGET_TEMPERATURE: &str = "temperature";
const ATTR_CURRENT_HUMIDITY: &str = "current_humidity";
const ATTR_SWITCH_POWER: &str = "current_power_w";
const ATTR_SWITCH_ENERGY: &str = "total_energy_kwh";

/// Turns an entity state into a backend reading for its mapped device
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadingFormatter;

impl ReadingFormatter {
    /// Format `entity` as a reading for `mapping.remote_device_id`.
    ///
    /// `associated_is_on` is the on/off state of the device's switch entity,
    /// attached to sensor readings. Returns `None` when the state carries no
    /// usable measurement.
    pub fn format(
        entity: &Entity,
        mapping: &EntityMapping,
        associated_is_on: Option<bool>,
    ) -> Option<Reading> {
        if !entity.is_available() {
            return None;
        }

        let mut reading = Reading::new(mapping.remote_device_id.as_str());
        match entity.domain() {
            "sensor" => {
                let value = entity.numeric_state()?;
                reading.is_on = associated_is_on;
                apply_measurement(&mut reading, mapping.capability, value, entity.unit());
            }
            "water_heater" => {
                read_thermostat(&mut reading, entity);
                reading.is_on = Some(entity.state != STATE_OFF && entity.state != "idle");
            }
            "climate" => {
                read_thermostat(&mut reading, entity);
                reading.humidity_pct = entity.attribute_f64(ATTR_CURRENT_HUMIDITY);
                reading.is_on = Some(entity.state != STATE_OFF);
            }
            "switch" | "input_boolean" => {
                reading.is_on = Some(entity.state == STATE_ON);
                reading.power_w = entity.attribute_f64(ATTR_SWITCH_POWER);
                reading.energy_kwh = entity.attribute_f64(ATTR_SWITCH_ENERGY);
            }
            "number" => {
                let value = entity.numeric_state()?;
                apply_measurement(&mut reading, mapping.capability, value, entity.unit());
            }
            _ => {}
        }

        reading.has_measurements().then_some(reading)
    }

    /// On/off state of an entity, `None` while it is unavailable
    pub fn on_off_state(entity: &Entity) -> Option<bool> {
        entity
            .is_available()
            .then(|| entity.state == STATE_ON)
    }
}

fn read_thermostat(reading: &mut Reading, entity: &Entity) {
    reading.temperature_c = entity.attribute_f64(ATTR_CURRENT_TEMPERATURE);
    reading.target_temperature_c = entity.attribute_f64(ATTR_TARGET_TEMPERATURE);
}

fn apply_measurement(reading: &mut Reading, capability: Capability, value: f64, unit: Option<&str>) {
    match capability {
        Capability::Power => reading.power_w = Some(to_watts(value, unit)),
        Capability::PowerL1 => reading.power_l1_w = Some(to_watts(value, unit)),
        Capability::PowerL2 => reading.power_l2_w = Some(to_watts(value, unit)),
        Capability::PowerL3 => reading.power_l3_w = Some(to_watts(value, unit)),
        Capability::Energy => reading.energy_kwh = Some(to_kilowatt_hours(value, unit)),
        Capability::EnergyImport => {
            reading.energy_import_kwh = Some(to_kilowatt_hours(value, unit))
        }
        Capability::EnergyExport => {
            reading.energy_export_kwh = Some(to_kilowatt_hours(value, unit))
        }
        Capability::SessionEnergy => {
            reading.session_energy_kwh = Some(to_kilowatt_hours(value, unit))
        }
        // A meter without phases reports on L1
        Capability::Voltage | Capability::VoltageL1 => reading.voltage_l1 = Some(value),
        Capability::VoltageL2 => reading.voltage_l2 = Some(value),
        Capability::VoltageL3 => reading.voltage_l3 = Some(value),
        Capability::Current | Capability::CurrentL1 => reading.current_l1 = Some(value),
        Capability::CurrentL2 => reading.current_l2 = Some(value),
        Capability::CurrentL3 => reading.current_l3 = Some(value),
        Capability::Temperature => reading.temperature_c = Some(value),
        Capability::TargetTemperature => reading.target_temperature_c = Some(value),
        Capability::Humidity => reading.humidity_pct = Some(value),
        Capability::ChargeLimit => reading.charge_limit_a = Some(value.trunc() as i64),
        Capability::OnOff => {}
    }
}
