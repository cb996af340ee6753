use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEventType {
    PowerOn,
    PowerOff,
}

/// What triggered a device event, as far as the runtime can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    UserManual,
    HaSchedule,
    HaPhysics,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnOff {
    On,
    Off,
}

impl From<bool> for OnOff {
    fn from(is_on: bool) -> Self {
        if is_on { OnOff::On } else { OnOff::Off }
    }
}

/// Discrete on/off transition of a remote device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub device_id: String,
    pub event_type: DeviceEventType,
    pub timestamp: DateTime<Utc>,
    pub ha_source: EventSource,
    pub old_state: OnOff,
    pub new_state: OnOff,
    /// Power reading carried by the change that flipped the state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f64>,
}

impl DeviceEvent {
    /// Event for a change from `was_on` to `is_on`; `None` when nothing flipped
    pub fn transition(
        device_id: impl Into<String>,
        was_on: bool,
        is_on: bool,
        power_w: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        if was_on == is_on {
            return None;
        }
        Some(Self {
            device_id: device_id.into(),
            event_type: if is_on {
                DeviceEventType::PowerOn
            } else {
                DeviceEventType::PowerOff
            },
            timestamp,
            ha_source: EventSource::Unknown,
            old_state: was_on.into(),
            new_state: is_on.into(),
            power_w,
        })
    }
}
