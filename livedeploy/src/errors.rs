//! Error types for the deployment controller

use thiserror::Error;

/// Main error type for livedeploy
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The outbound trigger call was rejected or never reached the endpoint
    #[error("Trigger request failed: {0}")]
    TriggerRequestFailed(String),

    /// An inbound push payload could not be decoded
    #[error("Event parse failed: {0}")]
    EventParseFailed(String),

    /// Transport-level failure on the push channel
    #[error("Channel connection error: {0}")]
    ChannelConnection(String),

    #[error("A deployment is already in progress")]
    AlreadyDeploying,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}
