//! Pusher protocol subscriber over WebSocket

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::DeployError;
use crate::pubsub::subscription::{ChannelMessage, PushSubscriber, Subscription, MESSAGE_BUFFER};

const PROTOCOL_VERSION: u8 = 7;
const CLIENT_NAME: &str = "livedeploy";

/// Hosted Pusher app to connect to
#[derive(Debug, Clone)]
pub struct PusherOptions {
    /// Public app key
    pub app_key: String,

    /// Cluster, e.g. `ap2`
    pub cluster: String,

    /// Host override for self-hosted Pusher compatible servers
    pub host: Option<String>,

    /// Use `wss`
    pub use_tls: bool,
}

impl Default for PusherOptions {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            cluster: "mt1".to_string(),
            host: None,
            use_tls: true,
        }
    }
}

/// Build the socket URL for an app
pub fn build_socket_url(options: &PusherOptions) -> Result<Url, DeployError> {
    if options.app_key.is_empty() {
        return Err(DeployError::ConfigError("Pusher app key is not configured".to_string()));
    }

    let host = options
        .host
        .clone()
        .unwrap_or_else(|| format!("ws-{}.pusher.com", options.cluster));
    let scheme = if options.use_tls { "wss" } else { "ws" };

    let mut url = Url::parse(&format!("{}://{}/app/{}", scheme, host, options.app_key))
        .map_err(|e| DeployError::ConfigError(format!("Invalid Pusher URL: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("protocol", &PROTOCOL_VERSION.to_string())
        .append_pair("client", CLIENT_NAME)
        .append_pair("version", env!("CARGO_PKG_VERSION"))
        .append_pair("flash", "false");

    Ok(url)
}

/// A protocol frame. `data` is usually a JSON encoded string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PusherFrame {
    pub event: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default)]
    pub data: Value,
}

impl PusherFrame {
    fn control(event: &str, data: Value) -> String {
        serde_json::json!({ "event": event, "data": data }).to_string()
    }

    pub fn subscribe(channel: &str) -> String {
        Self::control("pusher:subscribe", serde_json::json!({ "channel": channel }))
    }

    pub fn unsubscribe(channel: &str) -> String {
        Self::control("pusher:unsubscribe", serde_json::json!({ "channel": channel }))
    }

    pub fn pong() -> String {
        Self::control("pusher:pong", serde_json::json!({}))
    }

    /// Payload as the raw string the publisher sent
    pub fn data_string(&self) -> String {
        match &self.data {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// What to do with an incoming frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameAction {
    /// Write a frame back to the server
    Reply(String),

    /// Hand a message to the subscriber
    Forward(ChannelMessage),

    Ignore,
}

/// Decide how to handle one text frame for a subscription
pub fn handle_frame(text: &str, channel: &str, events: &[String]) -> FrameAction {
    let frame: PusherFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return FrameAction::Forward(ChannelMessage::TransportError(format!(
                "Unreadable frame from push channel: {}",
                e
            )));
        }
    };

    match frame.event.as_str() {
        "pusher:connection_established" => {
            debug!("Pusher connection established, subscribing to {}", channel);
            FrameAction::Reply(PusherFrame::subscribe(channel))
        }
        "pusher_internal:subscription_succeeded" => {
            info!("Subscribed to push channel: {}", channel);
            FrameAction::Ignore
        }
        "pusher:ping" => FrameAction::Reply(PusherFrame::pong()),
        "pusher:pong" => FrameAction::Ignore,
        "pusher:error" => FrameAction::Forward(ChannelMessage::TransportError(format!(
            "Push channel error: {}",
            frame.data_string()
        ))),
        name if frame.channel.as_deref() == Some(channel) && events.iter().any(|e| e == name) => {
            FrameAction::Forward(ChannelMessage::Event {
                name: name.to_string(),
                data: frame.data_string(),
            })
        }
        name => {
            debug!("Ignoring push event {} on {:?}", name, frame.channel);
            FrameAction::Ignore
        }
    }
}

/// Subscriber for a hosted Pusher app
#[derive(Debug, Clone)]
pub struct PusherSubscriber {
    options: PusherOptions,
}

impl PusherSubscriber {
    pub fn new(options: PusherOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl PushSubscriber for PusherSubscriber {
    async fn subscribe(&self, channel: &str, events: &[String]) -> Result<Subscription, DeployError> {
        let url = build_socket_url(&self.options)?;
        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_connection(
            url,
            channel.to_string(),
            events.to_vec(),
            tx,
            cancel.clone(),
        ));

        Ok(Subscription::new(channel, rx, cancel, task))
    }
}

async fn run_connection(
    url: Url,
    channel: String,
    events: Vec<String>,
    tx: mpsc::Sender<ChannelMessage>,
    cancel: CancellationToken,
) {
    info!("Connecting to push channel: {}", url.host_str().unwrap_or_default());

    let connection = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Subscription to {} cancelled before connecting", channel);
            return;
        }
        connection = connect_async(url.as_str()) => connection,
    };

    let mut ws_stream = match connection {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            error!("Failed to connect to push channel: {}", e);
            let _ = tx
                .send(ChannelMessage::TransportError(format!(
                    "Failed to connect to push channel: {}",
                    e
                )))
                .await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Unsubscribing from {}", channel);
                let _ = ws_stream.send(Message::Text(PusherFrame::unsubscribe(&channel).into())).await;
                let _ = ws_stream.close(None).await;
                return;
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match handle_frame(text.as_str(), &channel, &events) {
                            FrameAction::Reply(reply) => {
                                if let Err(e) = ws_stream.send(Message::Text(reply.into())).await {
                                    warn!("Failed to write to push channel: {}", e);
                                }
                            }
                            FrameAction::Forward(message) => {
                                if tx.send(message).await.is_err() {
                                    // Subscriber is gone
                                    let _ = ws_stream.close(None).await;
                                    return;
                                }
                            }
                            FrameAction::Ignore => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("Push channel closed the connection");
                        let _ = tx
                            .send(ChannelMessage::TransportError("Push channel connection closed".to_string()))
                            .await;
                        return;
                    }
                    Some(Err(e)) => {
                        error!("Push channel WebSocket error: {}", e);
                        let _ = tx
                            .send(ChannelMessage::TransportError(format!("Push channel error: {}", e)))
                            .await;
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
