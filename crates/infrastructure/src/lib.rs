//! Infrastructure layer - External integrations

pub mod backend;
pub mod config;
pub mod messaging;
pub mod runtime;
pub mod storage;

pub use backend::HttpBackendClient;
pub use config::BridgeConfig;
pub use messaging::{MqttClient, MqttMessage, StateStream};
pub use runtime::{InMemoryRuntime, RuntimeSnapshot};
pub use storage::FileMappingStore;
