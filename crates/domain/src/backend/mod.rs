//! Contract with the remote backend.

mod error;

pub use error::BackendError;

use crate::capability::Capability;
use crate::device_type::DeviceType;
use crate::entity::EntityId;
use crate::telemetry::{DeviceEvent, Reading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Device as registered with the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Local group id the backend keys its mapping by
    pub ha_device_id: String,
    pub device_type: DeviceType,
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub entity_mapping: BTreeMap<Capability, EntityId>,
    pub primary_entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    #[serde(default)]
    pub created: u32,
    #[serde(default)]
    pub updated: u32,
    #[serde(default)]
    pub removed: u32,
    /// Local group id -> remote device id
    #[serde(default)]
    pub device_mappings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    #[serde(default)]
    pub ingested: u32,
}

#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Register the selected devices; the backend replies with remote ids
    async fn sync_devices(
        &self,
        site_id: &str,
        devices: &[DeviceRecord],
    ) -> Result<SyncOutcome, BackendError>;

    /// Ingest one batch of readings stamped with a single timestamp
    async fn push_telemetry(
        &self,
        site_id: &str,
        timestamp: DateTime<Utc>,
        readings: &[Reading],
    ) -> Result<IngestOutcome, BackendError>;

    /// Report discrete device events such as on/off transitions
    async fn report_events(
        &self,
        site_id: &str,
        events: &[DeviceEvent],
    ) -> Result<IngestOutcome, BackendError>;
}
