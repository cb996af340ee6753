use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Result, anyhow};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Clone, Debug)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Subscribe-side MQTT connection. Incoming publishes are fanned out over a
/// broadcast channel; subscriptions are replayed after every reconnect.
#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    tx: broadcast::Sender<MqttMessage>,
    subscriptions: Arc<RwLock<Vec<String>>>,
}

impl MqttClient {
    /// Connect and drive the event loop until `shutdown` fires
    pub fn connect(
        host: &str,
        port: u16,
        client_id: &str,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(20));
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        let (tx, _) = broadcast::channel(1024);
        let subscriptions = Arc::new(RwLock::new(Vec::<String>::new()));

        let events = tx.clone();
        let replay = subscriptions.clone();
        let resubscriber = client.clone();

        let handle = tokio::spawn(async move {
            loop {
                let notification = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    notification = eventloop.poll() => notification,
                };

                match notification {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = MqttMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        };
                        // Nobody listening yet: the retained state arrives again on resubscribe
                        events.send(message).ok();
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                        let topics = replay
                            .read()
                            .unwrap_or_else(PoisonError::into_inner)
                            .clone();
                        if !topics.is_empty() {
                            debug!(topics = topics.len(), "Re-subscribing");
                        }
                        for topic in topics {
                            if let Err(e) = resubscriber.subscribe(&topic, QoS::AtLeastOnce).await {
                                error!(%topic, error = %e, "Failed to re-subscribe");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "MQTT connection error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }

            if let Err(e) = resubscriber.disconnect().await {
                debug!(error = %e, "MQTT disconnect after shutdown");
            }
            info!("MQTT event loop stopped");
        });

        (
            Self {
                client,
                tx,
                subscriptions,
            },
            handle,
        )
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<MqttMessage> {
        self.tx.subscribe()
    }

    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        {
            let mut topics = self
                .subscriptions
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if !topics.iter().any(|t| t == topic) {
                topics.push(topic.to_string());
            }
        }

        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| anyhow!("Failed to subscribe to topic {}: {}", topic, e))
    }
}
