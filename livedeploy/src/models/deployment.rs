//! Deployment models

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::models::catalog::{AppType, CloudProvider};

/// A deployment request submitted from the configuration form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    /// Target cloud provider
    pub cloud_provider: CloudProvider,

    /// Kind of application
    pub app_type: AppType,

    /// Region, must be one of the provider's regions
    pub region: String,

    /// User the deployment is triggered for
    #[serde(default)]
    pub username: String,
}

impl DeploymentRequest {
    pub fn new(
        cloud_provider: CloudProvider,
        app_type: AppType,
        region: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            cloud_provider,
            app_type,
            region: region.into(),
            username: username.into(),
        }
    }

    /// Check the region belongs to the selected provider
    pub fn validate(&self) -> Result<(), DeployError> {
        if !self.cloud_provider.has_region(&self.region) {
            return Err(DeployError::ValidationError(format!(
                "Region '{}' is not available for {} (expected one of: {})",
                self.region,
                self.cloud_provider,
                self.cloud_provider.regions().join(", ")
            )));
        }
        Ok(())
    }

    /// Check the request carries a username, which the trigger endpoint needs
    pub fn validate_username(&self) -> Result<(), DeployError> {
        if self.username.trim().is_empty() {
            return Err(DeployError::ValidationError(
                "A username is required to trigger a deployment".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DeploymentRequest {
    fn default() -> Self {
        Self {
            cloud_provider: CloudProvider::Aws,
            app_type: AppType::WebApplication,
            region: CloudProvider::Aws.default_region().to_string(),
            username: String::new(),
        }
    }
}

/// Links produced by a successful deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Public URL of the deployed application
    pub app_url: String,

    /// Monitoring dashboard URL
    pub monitor_url: String,

    /// Log explorer URL, when the source provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_url: Option<String>,

    /// Status reported by the source of the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl DeploymentResult {
    /// Result for a simulated deployment, derived from provider and region
    pub fn simulated(request: &DeploymentRequest) -> Self {
        let host = |service: &str| {
            format!(
                "https://{}-{}.{}.example.com",
                service,
                request.region,
                request.cloud_provider.slug()
            )
        };

        Self {
            app_url: host("myapp"),
            monitor_url: host("grafana"),
            logs_url: Some(host("kibana")),
            status: None,
        }
    }
}
