//! Deployment driven by an outbound trigger and pushed events

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::deploy::controller::RunContext;
use crate::deploy::events::{self, EventRole, PushEvent};
use crate::http::trigger::DeploymentTrigger;
use crate::models::deployment::DeploymentRequest;
use crate::models::log::LogEntry;
use crate::pubsub::subscription::{ChannelMessage, PushSubscriber};

/// Channel and event bindings for push mode
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Channel the deployment events are published on
    pub channel: String,

    /// Events carrying log lines only
    pub log_events: Vec<String>,

    /// Events that may end the run
    pub status_events: Vec<String>,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            channel: "deployment-channel".to_string(),
            log_events: vec!["deployment-log".to_string()],
            status_events: vec!["deployment-status".to_string()],
        }
    }
}

impl PushOptions {
    /// Every event name to bind
    pub fn events(&self) -> Vec<String> {
        self.status_events
            .iter()
            .chain(self.log_events.iter())
            .cloned()
            .collect()
    }

    /// Role of a bound event. Unknown names are treated as status events.
    pub fn role(&self, event: &str) -> EventRole {
        if self.log_events.iter().any(|e| e == event) && !self.status_events.iter().any(|e| e == event) {
            EventRole::Log
        } else {
            EventRole::Status
        }
    }
}

/// Trigger the deployment, then follow its events until the run ends
pub(crate) async fn run(
    ctx: RunContext,
    request: DeploymentRequest,
    options: PushOptions,
    trigger: Arc<dyn DeploymentTrigger>,
    subscriber: Arc<dyn PushSubscriber>,
) {
    if let Err(e) = trigger.trigger(&request).await {
        error!(run_id = %ctx.id(), "Failed to trigger deployment: {}", e);
        ctx.fail(
            LogEntry::error(format!("Failed to trigger deployment: {}", e)),
            e.to_string(),
        );
        return;
    }

    if !ctx.append(
        LogEntry::info(format!(
            "Deployment triggered for {}, waiting for updates...",
            request.username
        )),
        None,
    ) {
        return;
    }

    let mut subscription = match subscriber.subscribe(&options.channel, &options.events()).await {
        Ok(subscription) => subscription,
        Err(e) => {
            // Not fatal: the run stays open until destroyed
            warn!(run_id = %ctx.id(), "Failed to subscribe to {}: {}", options.channel, e);
            ctx.append(
                LogEntry::error(format!("Could not subscribe to deployment updates: {}", e)),
                None,
            );
            return;
        }
    };

    if !ctx.attach_subscription(subscription.cancel_token()) {
        return;
    }

    info!(run_id = %ctx.id(), "Listening for deployment events on {}", subscription.channel());

    while let Some(message) = subscription.recv().await {
        let live = match message {
            ChannelMessage::TransportError(reason) => {
                warn!(run_id = %ctx.id(), "Push channel error: {}", reason);
                ctx.append(LogEntry::error(format!("Push channel error: {}", reason)), None)
            }
            ChannelMessage::Event { name, data } => {
                debug!(run_id = %ctx.id(), "Received {} event", name);
                apply_event(&ctx, options.role(&name), &data)
            }
        };

        if !live {
            break;
        }
    }

    subscription.shutdown().await;
    debug!(run_id = %ctx.id(), "Push subscription closed");
}

/// Apply one raw event to the run. Returns whether the run is still live.
pub(crate) fn apply_event(ctx: &RunContext, role: EventRole, data: &str) -> bool {
    match events::decode(data) {
        Ok(PushEvent::Log { entry, progress }) => ctx.append(entry, progress),
        Ok(PushEvent::Failed { message }) => {
            ctx.fail(LogEntry::error(format!("Deployment failed: {}", message)), message);
            false
        }
        Ok(PushEvent::Completed { result, message }) => {
            let message = message.unwrap_or_else(|| "Deployment completed successfully!".to_string());
            ctx.succeed(result, Some(LogEntry::success(message)));
            false
        }
        Err(e) => {
            warn!(run_id = %ctx.id(), "Discarding malformed {:?} event: {}", role, e);
            match role {
                EventRole::Status => {
                    ctx.fail(LogEntry::error(format!("Malformed status event: {}", e)), e.to_string());
                    false
                }
                EventRole::Log => ctx.append(LogEntry::error(format!("Malformed event: {}", e)), None),
            }
        }
    }
}
