//! HTTP API tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use livedeploy::deploy::controller::{ControllerOptions, DeploymentController, DeploymentMode};
use livedeploy::deploy::playback::PlaybackOptions;
use livedeploy::deploy::push::PushOptions;
use livedeploy::errors::DeployError;
use livedeploy::http::trigger::DeploymentTrigger;
use livedeploy::models::deployment::DeploymentRequest;
use livedeploy::pubsub::memory::MemoryBroker;
use livedeploy::server::serve::router;
use livedeploy::server::state::ServerState;

struct OkTrigger;

#[async_trait]
impl DeploymentTrigger for OkTrigger {
    async fn trigger(&self, _request: &DeploymentRequest) -> Result<(), DeployError> {
        Ok(())
    }
}

fn app(mode: DeploymentMode) -> (Router, Arc<DeploymentController>) {
    let controller = Arc::new(DeploymentController::new(
        ControllerOptions {
            mode,
            playback: PlaybackOptions::instant(),
            push: PushOptions::default(),
        },
        Arc::new(OkTrigger),
        Arc::new(MemoryBroker::new()),
    ));
    let state = Arc::new(ServerState::new(controller.clone()));
    (router(state), controller)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn aws_request() -> Value {
    json!({
        "cloudProvider": "AWS",
        "appType": "Web Application",
        "region": "us-east-1",
        "username": "alice"
    })
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app(DeploymentMode::Playback);
    let (status, body) = send(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "livedeploy");
}

#[tokio::test]
async fn test_catalog_lists_providers() {
    let (app, _) = app(DeploymentMode::Playback);
    let (status, body) = send(&app, Method::GET, "/catalog", None).await;

    assert_eq!(status, StatusCode::OK);
    let rendered = body.to_string();
    for region in ["us-east-1", "westeurope", "us-central1"] {
        assert!(rendered.contains(region), "missing {region}");
    }
}

#[tokio::test]
async fn test_idle_snapshot() {
    let (app, _) = app(DeploymentMode::Playback);
    let (status, body) = send(&app, Method::GET, "/deployment", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
    assert_eq!(body["is_deploying"], false);
    assert_eq!(body["logs"], json!([]));
}

#[tokio::test]
async fn test_submit_and_follow_to_success() {
    let (app, controller) = app(DeploymentMode::Playback);
    let (status, body) = send(&app, Method::POST, "/deployment", Some(aws_request())).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["state"], "deploying");

    tokio::time::timeout(Duration::from_secs(5), controller.wait_until_settled())
        .await
        .unwrap();

    let (_, body) = send(&app, Method::GET, "/deployment", None).await;
    assert_eq!(body["state"], "success");
    assert_eq!(body["progress"], 100.0);
    assert_eq!(body["logs"].as_array().map(Vec::len), Some(24));
    assert_eq!(body["result"]["app_url"], "https://myapp-us-east-1.aws.example.com");
}

#[tokio::test]
async fn test_invalid_region_is_bad_request() {
    let (app, _) = app(DeploymentMode::Playback);
    let mut request = aws_request();
    request["region"] = json!("westeurope");

    let (status, body) = send(&app, Method::POST, "/deployment", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("westeurope"));
}

#[tokio::test]
async fn test_second_submit_conflicts_until_destroyed() {
    let (app, _) = app(DeploymentMode::Push);
    let (status, _) = send(&app, Method::POST, "/deployment", Some(aws_request())).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&app, Method::POST, "/deployment", Some(aws_request())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, body) = send(&app, Method::DELETE, "/deployment", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");

    let (status, _) = send(&app, Method::POST, "/deployment", Some(aws_request())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_restart_replaces_run() {
    let (app, _) = app(DeploymentMode::Push);
    let (_, first) = send(&app, Method::POST, "/deployment", Some(aws_request())).await;

    let (status, second) = send(&app, Method::PUT, "/deployment", Some(aws_request())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(second["state"], "deploying");
    assert_ne!(first["run_id"], second["run_id"]);
}

#[tokio::test]
async fn test_mode_override_on_submit() {
    let (app, controller) = app(DeploymentMode::Push);
    let mut request = aws_request();
    request["mode"] = json!("playback");

    let (status, body) = send(&app, Method::POST, "/deployment", Some(request)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["mode"], "playback");

    let settled = tokio::time::timeout(Duration::from_secs(5), controller.wait_until_settled())
        .await
        .unwrap();
    assert_eq!(settled.logs.len(), 24);
}

#[tokio::test]
async fn test_mode_override_on_restart() {
    let (app, controller) = app(DeploymentMode::Push);
    let (status, _) = send(&app, Method::POST, "/deployment", Some(aws_request())).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mut request = aws_request();
    request["mode"] = json!("playback");
    let (status, body) = send(&app, Method::PUT, "/deployment", Some(request)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["mode"], "playback");

    let settled = tokio::time::timeout(Duration::from_secs(5), controller.wait_until_settled())
        .await
        .unwrap();
    assert_eq!(settled.logs.len(), 24);
}
