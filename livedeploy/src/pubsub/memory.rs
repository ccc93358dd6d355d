//! In-process push channel

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::DeployError;
use crate::pubsub::subscription::{ChannelMessage, PushSubscriber, Subscription, MESSAGE_BUFFER};

struct Binding {
    channel: String,
    events: Vec<String>,
    tx: mpsc::Sender<ChannelMessage>,
    cancel: CancellationToken,
}

impl Binding {
    fn is_open(&self) -> bool {
        !self.tx.is_closed() && !self.cancel.is_cancelled()
    }
}

/// Broker that delivers published events to subscribers in the same process
#[derive(Default)]
pub struct MemoryBroker {
    bindings: Mutex<Vec<Binding>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `data` as event `name` on `channel`. Returns how many open
    /// subscriptions received it. A subscription whose buffer is full
    /// (`MESSAGE_BUFFER` unread messages) misses the event.
    pub fn publish(&self, channel: &str, name: &str, data: &str) -> usize {
        self.deliver(channel, |binding| {
            binding.events.iter().any(|e| e == name).then(|| ChannelMessage::Event {
                name: name.to_string(),
                data: data.to_string(),
            })
        })
    }

    /// Report a transport error to every subscriber of `channel`
    pub fn fail(&self, channel: &str, message: &str) -> usize {
        self.deliver(channel, |_| Some(ChannelMessage::TransportError(message.to_string())))
    }

    /// Number of subscriptions that are still open
    pub fn open_subscriptions(&self) -> usize {
        let mut bindings = self.lock();
        bindings.retain(Binding::is_open);
        bindings.len()
    }

    fn deliver<F>(&self, channel: &str, message_for: F) -> usize
    where
        F: Fn(&Binding) -> Option<ChannelMessage>,
    {
        let mut bindings = self.lock();
        bindings.retain(Binding::is_open);

        bindings
            .iter()
            .filter(|binding| binding.channel == channel)
            .filter_map(|binding| message_for(binding).map(|message| (binding, message)))
            .filter(|(binding, message)| match binding.tx.try_send(message.clone()) {
                Ok(()) => true,
                Err(e) => {
                    // Full buffers drop the message rather than block the publisher
                    debug!("Dropping message for {}: {}", binding.channel, e);
                    false
                }
            })
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Binding>> {
        self.bindings.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PushSubscriber for MemoryBroker {
    async fn subscribe(&self, channel: &str, events: &[String]) -> Result<Subscription, DeployError> {
        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let cancel = CancellationToken::new();
        self.lock().push(Binding {
            channel: channel.to_string(),
            events: events.to_vec(),
            tx,
            cancel: cancel.clone(),
        });
        Ok(Subscription::from_receiver(channel, rx, cancel))
    }
}
