//! Push channel subscription handle

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::DeployError;

/// Capacity of the per-subscription message buffer
pub const MESSAGE_BUFFER: usize = 64;

/// A message delivered by a push channel transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// A bound event with its raw payload
    Event { name: String, data: String },

    /// Transport-level problem, the subscription may or may not continue
    TransportError(String),
}

/// Subscribes to named events on a push channel
#[async_trait]
pub trait PushSubscriber: Send + Sync {
    /// Open a subscription for `events` on `channel`.
    ///
    /// Connection happens in the background; failures after this call
    /// returns arrive as [`ChannelMessage::TransportError`].
    async fn subscribe(&self, channel: &str, events: &[String]) -> Result<Subscription, DeployError>;
}

/// An open subscription.
///
/// Closing cancels the subscription's token: the transport task unsubscribes,
/// the broker stops delivering and `recv` returns `None` from then on.
/// Dropping the subscription closes it.
pub struct Subscription {
    channel: String,
    rx: mpsc::Receiver<ChannelMessage>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Subscription backed by a transport task that watches `cancel`
    pub fn new(
        channel: impl Into<String>,
        rx: mpsc::Receiver<ChannelMessage>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            channel: channel.into(),
            rx,
            cancel,
            task: Some(task),
        }
    }

    /// Subscription fed directly by a sender, with no transport task
    pub fn from_receiver(
        channel: impl Into<String>,
        rx: mpsc::Receiver<ChannelMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            channel: channel.into(),
            rx,
            cancel,
            task: None,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Token that closes this subscription when cancelled. Lets an owner
    /// close it without holding the subscription.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the next message. `None` once closed or the transport is gone.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            message = self.rx.recv() => message,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.rx.is_closed()
    }

    /// Close the subscription. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!("Closing subscription to {}", self.channel);
            self.cancel.cancel();
        }
        self.rx.close();
    }

    /// Close and wait for the transport task to finish unsubscribing
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("closed", &self.is_closed())
            .finish()
    }
}
