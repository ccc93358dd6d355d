//! HTTP client implementation

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error};

use crate::errors::DeployError;

/// HTTP client for outbound calls
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("livedeploy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// POST a JSON body and only check that the call succeeded.
    /// The response body is discarded.
    pub async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> Result<(), DeployError> {
        debug!("POST {}", url);

        let response = self.client.post(url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP POST failed: {} - {}", status, body);
            return Err(DeployError::TriggerRequestFailed(format!("{}: {}", status, body)));
        }

        Ok(())
    }
}
