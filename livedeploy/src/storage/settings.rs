//! Settings file management

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::deploy::controller::{ControllerOptions, DeploymentMode};
use crate::deploy::playback::PlaybackOptions;
use crate::deploy::push::PushOptions;
use crate::logs::LogLevel;
use crate::pubsub::mqtt::MqttAddress;
use crate::pubsub::pusher::PusherOptions;

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling log files. Logs only go to stdout when unset.
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Default source of deployment updates
    #[serde(default)]
    pub mode: DeploymentMode,

    /// Local playback timing
    #[serde(default)]
    pub playback: PlaybackSettings,

    /// Outbound trigger call
    #[serde(default)]
    pub trigger: TriggerSettings,

    /// Push channel
    #[serde(default)]
    pub push: PushSettings,

    /// MQTT broker, used when the push transport is `mqtt`
    #[serde(default)]
    pub mqtt_broker: MqttBrokerSettings,

    /// Local HTTP server
    #[serde(default)]
    pub server: ServerSettings,

    /// Maximum time allowed for a graceful shutdown
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_shutdown_delay() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            mode: DeploymentMode::Playback,
            playback: PlaybackSettings::default(),
            trigger: TriggerSettings::default(),
            push: PushSettings::default(),
            mqtt_broker: MqttBrokerSettings::default(),
            server: ServerSettings::default(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

impl Settings {
    /// Options for the deployment controller
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            mode: self.mode,
            playback: PlaybackOptions {
                min_step_delay: Duration::from_millis(self.playback.min_step_delay_ms),
                max_step_delay: Duration::from_millis(self.playback.max_step_delay_ms),
            },
            push: PushOptions {
                channel: self.push.channel.clone(),
                log_events: self.push.log_events.clone(),
                status_events: self.push.status_events.clone(),
            },
        }
    }

    pub fn pusher_options(&self) -> PusherOptions {
        PusherOptions {
            app_key: self.push.app_key.clone(),
            cluster: self.push.cluster.clone(),
            host: self.push.host.clone(),
            use_tls: self.push.use_tls,
        }
    }

    pub fn mqtt_address(&self) -> MqttAddress {
        MqttAddress {
            host: self.mqtt_broker.host.clone(),
            port: self.mqtt_broker.port,
            use_tls: self.mqtt_broker.tls,
            ca_cert_path: self.mqtt_broker.ca_cert_path.clone(),
            username: self.mqtt_broker.username.clone(),
            password: self.mqtt_broker.password.clone(),
        }
    }
}

/// Playback timing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    #[serde(default = "default_min_step_delay")]
    pub min_step_delay_ms: u64,

    #[serde(default = "default_max_step_delay")]
    pub max_step_delay_ms: u64,
}

fn default_min_step_delay() -> u64 {
    500
}

fn default_max_step_delay() -> u64 {
    1500
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            min_step_delay_ms: default_min_step_delay(),
            max_step_delay_ms: default_max_step_delay(),
        }
    }
}

/// Trigger endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSettings {
    /// Deployment initiation URL
    #[serde(default)]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_trigger_timeout")]
    pub timeout_secs: u64,
}

fn default_trigger_timeout() -> u64 {
    30
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_trigger_timeout(),
        }
    }
}

/// Push transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushTransport {
    #[default]
    Pusher,
    Mqtt,
}

/// Push channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSettings {
    #[serde(default)]
    pub transport: PushTransport,

    #[serde(default = "default_channel")]
    pub channel: String,

    /// Pusher app key
    #[serde(default)]
    pub app_key: String,

    /// Pusher cluster
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// Host override for Pusher compatible servers
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_true")]
    pub use_tls: bool,

    #[serde(default = "default_log_events")]
    pub log_events: Vec<String>,

    #[serde(default = "default_status_events")]
    pub status_events: Vec<String>,
}

fn default_channel() -> String {
    "deployment-channel".to_string()
}

fn default_cluster() -> String {
    "mt1".to_string()
}

fn default_log_events() -> Vec<String> {
    vec!["deployment-log".to_string()]
}

fn default_status_events() -> Vec<String> {
    vec!["deployment-status".to_string()]
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            transport: PushTransport::Pusher,
            channel: default_channel(),
            app_key: String::new(),
            cluster: default_cluster(),
            host: None,
            use_tls: true,
            log_events: default_log_events(),
            status_events: default_status_events(),
        }
    }
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttBrokerSettings {
    /// Broker host
    #[serde(default)]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Use TLS
    #[serde(default = "default_true")]
    pub tls: bool,

    /// Optional path to a PEM-encoded CA certificate for broker TLS verification.
    /// When absent, the system certificate store is used.
    #[serde(default)]
    pub ca_cert_path: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<SecretString>,
}

fn default_mqtt_port() -> u16 {
    8883
}

impl Default for MqttBrokerSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mqtt_port(),
            tls: true,
            ca_cert_path: None,
            username: None,
            password: None,
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}
