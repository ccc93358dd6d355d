//! Application configuration options

use std::time::Duration;

use crate::deploy::controller::ControllerOptions;
use crate::pubsub::mqtt::MqttAddress;
use crate::pubsub::pusher::PusherOptions;
use crate::storage::settings::{PushTransport, Settings};

/// Main application options
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Deployment controller configuration
    pub controller: ControllerOptions,

    /// Outbound trigger configuration
    pub trigger: TriggerOptions,

    /// Which push transport backs the subscriber
    pub transport: TransportOptions,

    /// Server configuration
    pub server: ServerOptions,
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let transport = match settings.push.transport {
            PushTransport::Pusher => TransportOptions::Pusher(settings.pusher_options()),
            PushTransport::Mqtt => TransportOptions::Mqtt(settings.mqtt_address()),
        };

        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            controller: settings.controller_options(),
            trigger: TriggerOptions {
                url: settings.trigger.url.clone(),
                timeout: Duration::from_secs(settings.trigger.timeout_secs),
            },
            transport,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
        }
    }
}

/// Lifecycle options for the service
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(10),
        }
    }
}

/// Trigger webhook options
#[derive(Debug, Clone)]
pub struct TriggerOptions {
    pub url: String,
    pub timeout: Duration,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Push transport selection
#[derive(Debug, Clone)]
pub enum TransportOptions {
    Pusher(PusherOptions),
    Mqtt(MqttAddress),
}

impl Default for TransportOptions {
    fn default() -> Self {
        TransportOptions::Pusher(PusherOptions::default())
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
