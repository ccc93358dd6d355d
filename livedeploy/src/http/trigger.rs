//! Deployment trigger endpoint

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::models::deployment::DeploymentRequest;

/// Body of the trigger call
#[derive(Debug, Clone, Serialize)]
pub struct TriggerBody<'a> {
    pub username: &'a str,
}

/// Starts a remote deployment
#[async_trait]
pub trait DeploymentTrigger: Send + Sync {
    async fn trigger(&self, request: &DeploymentRequest) -> Result<(), DeployError>;
}

/// Trigger that posts the username to a webhook URL
#[derive(Debug, Clone)]
pub struct WebhookTrigger {
    http_client: HttpClient,
    url: String,
}

impl WebhookTrigger {
    pub fn new(http_client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DeploymentTrigger for WebhookTrigger {
    async fn trigger(&self, request: &DeploymentRequest) -> Result<(), DeployError> {
        if self.url.is_empty() {
            return Err(DeployError::TriggerRequestFailed(
                "Trigger URL is not configured".to_string(),
            ));
        }

        info!("Triggering deployment for {}", request.username);
        self.http_client
            .post_json(
                &self.url,
                &TriggerBody {
                    username: &request.username,
                },
            )
            .await
            .map_err(|e| match e {
                failed @ DeployError::TriggerRequestFailed(_) => failed,
                other => DeployError::TriggerRequestFailed(other.to_string()),
            })
    }
}
