mod pending;
mod push_service;

pub use pending::PendingBatch;
pub use push_service::{PushSettings, TelemetryPushService};
