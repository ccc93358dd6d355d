//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::deploy::controller::DeploymentMode;
use crate::errors::DeployError;
use crate::models::catalog::catalog;
use crate::models::deployment::DeploymentRequest;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Error body returned by the API
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Wrapper so handlers can return `DeployError` directly
pub struct ApiError(pub DeployError);

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DeployError::ValidationError(_) => StatusCode::BAD_REQUEST,
            DeployError::AlreadyDeploying => StatusCode::CONFLICT,
            DeployError::InvalidTransition(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "livedeploy".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Providers, regions and application types for the form
pub async fn catalog_handler() -> impl IntoResponse {
    Json(catalog())
}

/// Current deployment snapshot
pub async fn deployment_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.controller.snapshot())
}

/// Submit and restart request body
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub request: DeploymentRequest,

    /// Overrides the configured mode for this run
    #[serde(default)]
    pub mode: Option<DeploymentMode>,
}

/// Start a deployment
pub async fn submit_handler(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mode = body.mode.unwrap_or(state.controller.options().mode);
    let snapshot = state.controller.submit_with_mode(body.request, mode)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// Tear down the current deployment and start a new one
pub async fn restart_handler(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mode = body.mode.unwrap_or(state.controller.options().mode);
    let snapshot = state.controller.restart_with_mode(body.request, mode)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// Tear down the current deployment
pub async fn destroy_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.controller.destroy())
}
