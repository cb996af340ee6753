use std::sync::Arc;

use anyhow::Result;
use domain::EntityId;
use domain::runtime::SUPPORTED_DOMAINS;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{MqttClient, MqttMessage};
use crate::runtime::InMemoryRuntime;

const STATE_SUFFIX: &str = "state";

/// Attributes published alongside states that carry no measurement
const IGNORED_ATTRIBUTES: [&str; 2] = ["last_changed", "last_updated"];

/// One decoded state-stream message
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    State {
        entity_id: EntityId,
        state: String,
    },
    Attribute {
        entity_id: EntityId,
        key: String,
        value: Value,
    },
}

impl StreamUpdate {
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::State { entity_id, .. } | Self::Attribute { entity_id, .. } => entity_id,
        }
    }
}

/// Decode `<base>/<domain>/<object_id>/state` and
/// `<base>/<domain>/<object_id>/<attribute>` messages.
///
/// States arrive as raw text, attributes as JSON values. Topics outside the
/// base, for unsupported domains or with malformed ids yield `None`.
pub fn parse_message(base_topic: &str, topic: &str, payload: &[u8]) -> Option<StreamUpdate> {
    let rest = topic
        .strip_prefix(base_topic.trim_end_matches('/'))?
        .strip_prefix('/')?;
    let mut parts = rest.split('/');
    let (domain, object_id, leaf) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || !SUPPORTED_DOMAINS.contains(&domain) {
        return None;
    }

    let entity_id = EntityId::new(format!("{domain}.{object_id}")).ok()?;
    let text = std::str::from_utf8(payload).ok()?.trim();

    if leaf == STATE_SUFFIX {
        return Some(StreamUpdate::State {
            entity_id,
            state: text.to_string(),
        });
    }
    if IGNORED_ATTRIBUTES.contains(&leaf) {
        return None;
    }

    let value =
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
    Some(StreamUpdate::Attribute {
        entity_id,
        key: leaf.to_string(),
        value,
    })
}

/// Feeds a broker's state stream into the in-memory runtime
pub struct StateStream {
    client: MqttClient,
    base_topic: String,
    runtime: Arc<InMemoryRuntime>,
}

impl StateStream {
    pub fn new(client: MqttClient, base_topic: &str, runtime: Arc<InMemoryRuntime>) -> Self {
        Self {
            client,
            base_topic: base_topic.trim_end_matches('/').to_string(),
            runtime,
        }
    }

    /// Subscribe to the stream and apply messages until `shutdown` fires
    pub async fn start(self, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        let mut rx = self.client.subscribe_messages();
        let filter = format!("{}/#", self.base_topic);
        self.client.subscribe(&filter).await?;
        info!(topic = %filter, "Listening to state stream");

        Ok(tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = rx.recv() => received,
                };
                match message {
                    Ok(message) => self.handle(&message),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "State stream lagged, messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("State stream stopped");
        }))
    }

    fn handle(&self, message: &MqttMessage) {
        if let Some(update) = parse_message(&self.base_topic, &message.topic, &message.payload) {
            apply(&self.runtime, update);
        }
    }
}

/// Write one update into the runtime, which broadcasts the resulting change
pub fn apply(runtime: &InMemoryRuntime, update: StreamUpdate) {
    match update {
        StreamUpdate::State { entity_id, state } => {
            runtime.set_state(&entity_id, &state);
        }
        StreamUpdate::Attribute {
            entity_id,
            key,
            value,
        } => {
            runtime.set_attribute(&entity_id, &key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::EntityRegistry;
    use serde_json::json;

    const BASE: &str = "homeassistant";

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(
            parse_message(BASE, "homeassistant/sensor/wh_power/state", b"1800"),
            Some(StreamUpdate::State {
                entity_id: id("sensor.wh_power"),
                state: "1800".to_string()
            })
        );
    }

    #[test]
    fn test_parse_attributes() {
        assert_eq!(
            parse_message(BASE, "homeassistant/water_heater/wh/temperature", b"65.5"),
            Some(StreamUpdate::Attribute {
                entity_id: id("water_heater.wh"),
                key: "temperature".to_string(),
                value: json!(65.5)
            })
        );
        // Unquoted text falls back to a string value
        assert_eq!(
            parse_message(BASE, "homeassistant/sensor/han_power/unit_of_measurement", b"kW"),
            Some(StreamUpdate::Attribute {
                entity_id: id("sensor.han_power"),
                key: "unit_of_measurement".to_string(),
                value: json!("kW")
            })
        );
    }

    #[test]
    fn test_parse_rejects_foreign_topics() {
        assert_eq!(parse_message(BASE, "other/sensor/a/state", b"1"), None);
        assert_eq!(parse_message(BASE, "homeassistant/light/kitchen/state", b"on"), None);
        assert_eq!(parse_message(BASE, "homeassistant/sensor/a", b"1"), None);
        assert_eq!(parse_message(BASE, "homeassistant/sensor/a/b/c", b"1"), None);
        assert_eq!(parse_message(BASE, "homeassistant/sensor/Bad-Id/state", b"1"), None);
        assert_eq!(
            parse_message(BASE, "homeassistant/sensor/a/last_updated", b"\"2024\""),
            None
        );
    }

    #[test]
    fn test_apply_builds_entity() {
        let runtime = InMemoryRuntime::new();
        for (topic, payload) in [
            ("homeassistant/sensor/han_power/device_class", &b"\"power\""[..]),
            ("homeassistant/sensor/han_power/state", &b"1.5"[..]),
            ("homeassistant/sensor/han_power/unit_of_measurement", &b"\"kW\""[..]),
        ] {
            apply(&runtime, parse_message(BASE, topic, payload).unwrap());
        }

        let entity = runtime.state_of(&id("sensor.han_power")).unwrap();
        assert_eq!(entity.state, "1.5");
        assert_eq!(entity.unit(), Some("kW"));
        assert_eq!(entity.device_class(), Some("power"));
    }
}
