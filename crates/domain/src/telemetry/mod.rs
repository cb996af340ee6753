//! Typed telemetry readings and their formatting from entity states.

mod event;
mod formatter;
mod reading;
pub mod units;

pub use event::{DeviceEvent, DeviceEventType, EventSource, OnOff};
pub use formatter::ReadingFormatter;
pub use reading::Reading;
