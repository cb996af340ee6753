pub mod mqtt_client;
pub mod statestream;

pub use mqtt_client::{MqttClient, MqttMessage};
pub use statestream::{StateStream, StreamUpdate, apply, parse_message};
