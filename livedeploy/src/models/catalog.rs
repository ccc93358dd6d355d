//! Supported cloud providers, regions and application types

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Cloud provider a deployment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloudProvider {
    #[serde(rename = "AWS", alias = "aws")]
    Aws,
    #[serde(rename = "Azure", alias = "azure")]
    Azure,
    #[serde(rename = "GCP", alias = "gcp")]
    Gcp,
}

impl CloudProvider {
    pub const ALL: [CloudProvider; 3] = [CloudProvider::Aws, CloudProvider::Azure, CloudProvider::Gcp];

    /// Short code, as shown in the provider picker
    pub fn code(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "AWS",
            CloudProvider::Azure => "Azure",
            CloudProvider::Gcp => "GCP",
        }
    }

    /// Human readable provider name
    pub fn label(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "Amazon Web Services",
            CloudProvider::Azure => "Microsoft Azure",
            CloudProvider::Gcp => "Google Cloud Platform",
        }
    }

    /// Lowercase code used in generated hostnames
    pub fn slug(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Azure => "azure",
            CloudProvider::Gcp => "gcp",
        }
    }

    /// Regions offered for this provider. The first entry is the default.
    pub fn regions(&self) -> &'static [&'static str] {
        match self {
            CloudProvider::Aws => &["us-east-1", "us-west-2", "eu-west-1"],
            CloudProvider::Azure => &["eastus", "westus2", "westeurope"],
            CloudProvider::Gcp => &["us-central1", "us-west1", "europe-west1"],
        }
    }

    pub fn default_region(&self) -> &'static str {
        self.regions()[0]
    }

    pub fn has_region(&self, region: &str) -> bool {
        self.regions().contains(&region)
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CloudProvider {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" => Ok(CloudProvider::Aws),
            "azure" => Ok(CloudProvider::Azure),
            "gcp" => Ok(CloudProvider::Gcp),
            _ => Err(DeployError::ValidationError(format!(
                "Unknown cloud provider: {}",
                s
            ))),
        }
    }
}

/// Kind of application being deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppType {
    #[serde(rename = "Web Application", alias = "web")]
    WebApplication,
    #[serde(rename = "API Service", alias = "api")]
    ApiService,
    #[serde(rename = "Microservice", alias = "microservice")]
    Microservice,
    #[serde(rename = "Static Website", alias = "static")]
    StaticWebsite,
}

impl AppType {
    pub const ALL: [AppType; 4] = [
        AppType::WebApplication,
        AppType::ApiService,
        AppType::Microservice,
        AppType::StaticWebsite,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AppType::WebApplication => "Web Application",
            AppType::ApiService => "API Service",
            AppType::Microservice => "Microservice",
            AppType::StaticWebsite => "Static Website",
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for AppType {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "web" | "webapplication" | "webapp" => Ok(AppType::WebApplication),
            "api" | "apiservice" => Ok(AppType::ApiService),
            "microservice" => Ok(AppType::Microservice),
            "static" | "staticwebsite" | "staticsite" => Ok(AppType::StaticWebsite),
            _ => Err(DeployError::ValidationError(format!(
                "Unknown application type: {}",
                s
            ))),
        }
    }
}

/// Provider entry as exposed to the rendering layer
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub value: CloudProvider,
    pub label: &'static str,
    pub regions: Vec<&'static str>,
}

/// Static catalog consumed by the deployment form
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub providers: Vec<ProviderInfo>,
    pub app_types: Vec<AppType>,
}

/// Build the catalog of supported providers and application types
pub fn catalog() -> Catalog {
    Catalog {
        providers: CloudProvider::ALL
            .iter()
            .map(|provider| ProviderInfo {
                value: *provider,
                label: provider.label(),
                regions: provider.regions().to_vec(),
            })
            .collect(),
        app_types: AppType::ALL.to_vec(),
    }
}
