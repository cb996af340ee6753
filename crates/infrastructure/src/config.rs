use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use domain::ClassifierRules;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const SYNC_INTERVAL_BOUNDS: RangeInclusive<u64> = 60..=3600;
pub const PUSH_INTERVAL_BOUNDS: RangeInclusive<u64> = 10..=300;
pub const HEARTBEAT_INTERVAL_BOUNDS: RangeInclusive<u64> = 10..=300;
pub const MAX_BATCH_SIZE_BOUNDS: RangeInclusive<usize> = 1..=500;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,
}

fn default_timeout() -> u64 {
    30
}
fn default_rate_limit() -> usize {
    60
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
}

fn default_base_topic() -> String {
    "homeassistant".to_string()
}

/// Where the in-memory runtime gets its entities from
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RuntimeConfig {
    /// JSON snapshot seeding registries and states at startup
    #[serde(default)]
    pub snapshot_path: Option<String>,
    /// State-stream broker keeping entity states live
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BridgeConfig {
    pub site_id: String,
    /// Group ids, or entity ids from older installs
    #[serde(default)]
    pub selected_devices: Vec<String>,
    pub api: ApiConfig,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_push_interval")]
    pub push_interval_secs: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default)]
    pub classifier: ClassifierRules,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_sync_interval() -> u64 {
    300
}
fn default_push_interval() -> u64 {
    30
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_max_batch_size() -> usize {
    50
}
fn default_state_dir() -> String {
    "state".to_string()
}

impl BridgeConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("api.base_url", "http://localhost:8000")?
            // config/default.toml must exist; no silent start on built-in values
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(true))
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // e.g. BRIDGE__API__API_KEY=secret
            .add_source(Environment::with_prefix("BRIDGE").separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        Ok(config.clamped())
    }

    /// Pull every interval and the batch size into its allowed range
    pub fn clamped(mut self) -> Self {
        self.sync_interval_secs = clamp(
            "sync_interval_secs",
            self.sync_interval_secs,
            SYNC_INTERVAL_BOUNDS,
        );
        self.push_interval_secs = clamp(
            "push_interval_secs",
            self.push_interval_secs,
            PUSH_INTERVAL_BOUNDS,
        );
        self.heartbeat_interval_secs = clamp(
            "heartbeat_interval_secs",
            self.heartbeat_interval_secs,
            HEARTBEAT_INTERVAL_BOUNDS,
        );
        self.max_batch_size = clamp(
            "max_batch_size",
            self.max_batch_size,
            MAX_BATCH_SIZE_BOUNDS,
        );
        self
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.push_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn mappings_path(&self) -> PathBuf {
        PathBuf::from(&self.state_dir).join("last_known_mappings.json")
    }
}

fn clamp<T>(key: &str, value: T, bounds: RangeInclusive<T>) -> T
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let clamped = if value < *bounds.start() {
        *bounds.start()
    } else if value > *bounds.end() {
        *bounds.end()
    } else {
        value
    };
    if clamped != value {
        warn!(key, configured = %value, used = %clamped, "Configured value out of range, clamped");
    }
    clamped
}
