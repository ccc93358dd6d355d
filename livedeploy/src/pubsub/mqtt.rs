//! MQTT subscriber for push channels

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::DeployError;
use crate::pubsub::subscription::{ChannelMessage, PushSubscriber, Subscription, MESSAGE_BUFFER};

const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);

/// MQTT broker address
#[derive(Debug, Clone)]
pub struct MqttAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// Optional path to a PEM-encoded CA certificate for broker verification.
    /// When `None` and `use_tls` is `true`, the system certificate store is used.
    pub ca_cert_path: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl Default for MqttAddress {
    fn default() -> Self {
        Self {
            host: "".to_string(),
            port: 8883,
            use_tls: true,
            ca_cert_path: None,
            username: None,
            password: None,
        }
    }
}

/// Topic layout: each event on a channel is published to `<channel>/<event>`
pub struct Topics;

impl Topics {
    /// Filter matching every event of a channel
    pub fn channel_filter(channel: &str) -> String {
        format!("{}/+", channel.trim_end_matches('/'))
    }

    /// Extract the event name from a topic on `channel`
    pub fn parse_event_name(channel: &str, topic: &str) -> Option<String> {
        topic
            .strip_prefix(channel.trim_end_matches('/'))
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .map(str::to_string)
    }
}

/// MQTT client wrapper
pub struct MqttClient {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttClient {
    /// Create a new MQTT client
    pub fn new(address: &MqttAddress, client_id: &str) -> Result<Self, DeployError> {
        if address.host.is_empty() {
            return Err(DeployError::ConfigError("MQTT host is not configured".to_string()));
        }

        let mut options = MqttOptions::new(client_id, &address.host, address.port);
        options.set_keep_alive(Duration::from_secs(30));

        if let Some(username) = &address.username {
            let password = address
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string())
                .unwrap_or_default();
            options.set_credentials(username, password);
        }

        if address.use_tls {
            use rumqttc::{TlsConfiguration, Transport};
            use rustls::ClientConfig;
            use std::sync::Arc;

            let mut root_cert_store = rustls::RootCertStore::empty();

            if let Some(ref ca_path) = address.ca_cert_path {
                let ca_pem = std::fs::read(ca_path).map_err(|e| {
                    DeployError::ConfigError(format!("Failed to read CA cert {ca_path}: {e}"))
                })?;
                let mut cursor = std::io::Cursor::new(ca_pem);
                for cert in rustls_pemfile::certs(&mut cursor).flatten() {
                    let _ = root_cert_store.add(cert);
                }
            } else {
                for cert in rustls_native_certs::load_native_certs().unwrap_or_default() {
                    let _ = root_cert_store.add(cert);
                }
            }

            let client_config = ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();

            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::new(client_config),
            )));
        }

        let (client, eventloop) = AsyncClient::new(options, 10);

        Ok(Self { client, eventloop })
    }

    /// Subscribe to every event published on a channel
    pub async fn subscribe_channel(&mut self, channel: &str) -> Result<(), DeployError> {
        let filter = Topics::channel_filter(channel);
        self.client
            .subscribe(&filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| DeployError::ChannelConnection(e.to_string()))?;
        info!("Subscribed to: {}", filter);
        Ok(())
    }

    /// Poll for the next publish
    pub async fn poll(&mut self) -> Result<Option<MqttMessage>, DeployError> {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!("Received message on topic: {}", publish.topic);
                Ok(Some(MqttMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                }))
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected");
                Ok(None)
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                debug!("Subscription acknowledged");
                Ok(None)
            }
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("MQTT poll error: {}", e);
                Err(DeployError::ChannelConnection(e.to_string()))
            }
        }
    }

    /// Unsubscribe and disconnect from the broker
    pub async fn disconnect(&mut self, channel: &str) -> Result<(), DeployError> {
        let _ = self.client.unsubscribe(Topics::channel_filter(channel)).await;
        self.client
            .disconnect()
            .await
            .map_err(|e| DeployError::ChannelConnection(e.to_string()))?;
        info!("MQTT disconnected");
        Ok(())
    }
}

/// MQTT message
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Subscriber that reads push events from an MQTT broker
#[derive(Debug, Clone)]
pub struct MqttSubscriber {
    address: MqttAddress,
}

impl MqttSubscriber {
    pub fn new(address: MqttAddress) -> Self {
        Self { address }
    }
}

#[async_trait]
impl PushSubscriber for MqttSubscriber {
    async fn subscribe(&self, channel: &str, events: &[String]) -> Result<Subscription, DeployError> {
        let client_id = format!("livedeploy-{}", uuid::Uuid::new_v4().simple());
        let mut client = MqttClient::new(&self.address, &client_id)?;
        client.subscribe_channel(channel).await?;

        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_eventloop(
            client,
            channel.to_string(),
            events.to_vec(),
            tx,
            cancel.clone(),
        ));

        Ok(Subscription::new(channel, rx, cancel, task))
    }
}

async fn run_eventloop(
    mut client: MqttClient,
    channel: String,
    events: Vec<String>,
    tx: mpsc::Sender<ChannelMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                close(client, &channel).await;
                return;
            }
            polled = client.poll() => {
                match polled {
                    Ok(Some(msg)) => {
                        let Some(name) = Topics::parse_event_name(&channel, &msg.topic) else {
                            continue;
                        };
                        if !events.contains(&name) {
                            debug!("Ignoring unbound event {} on {}", name, channel);
                            continue;
                        }
                        let data = String::from_utf8_lossy(&msg.payload).into_owned();
                        if tx.send(ChannelMessage::Event { name, data }).await.is_err() {
                            close(client, &channel).await;
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("MQTT connection lost: {}", e);
                        let _ = tx.send(ChannelMessage::TransportError(e.to_string())).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Unsubscribe, then drive the event loop until the disconnect is flushed
async fn close(mut client: MqttClient, channel: &str) {
    if let Err(e) = client.disconnect(channel).await {
        debug!("MQTT disconnect failed: {}", e);
        return;
    }
    let _ = tokio::time::timeout(DISCONNECT_FLUSH, async {
        while client.poll().await.is_ok() {}
    })
    .await;
}
