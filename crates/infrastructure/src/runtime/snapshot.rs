use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use domain::{DeviceInfo, Entity};
use serde::{Deserialize, Serialize};

/// Registry and state dump used to seed the in-memory runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    /// Parent device id -> descriptive metadata
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceInfo>,
    #[serde(default)]
    pub entities: Vec<SnapshotEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntity {
    #[serde(flatten)]
    pub entity: Entity,
    /// Parent device, absent for orphan entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl RuntimeSnapshot {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read runtime snapshot {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid runtime snapshot {}", path.display()))
    }
}
