//! Deployment controller tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use livedeploy::deploy::controller::{
    ControllerOptions, DeploymentController, DeploymentMode, DeploymentSnapshot,
};
use livedeploy::deploy::fsm::DeploymentState;
use livedeploy::deploy::playback::{script, PlaybackOptions};
use livedeploy::deploy::push::PushOptions;
use livedeploy::errors::DeployError;
use livedeploy::http::trigger::DeploymentTrigger;
use livedeploy::models::catalog::{AppType, CloudProvider};
use livedeploy::models::deployment::DeploymentRequest;
use livedeploy::models::log::Severity;
use livedeploy::pubsub::memory::MemoryBroker;

const CHANNEL: &str = "deployment-channel";
const STATUS: &str = "deployment-status";
const LOG: &str = "deployment-log";

// ================================ FAKES =========================================== //

#[derive(Default)]
struct CountingTrigger {
    calls: AtomicUsize,
}

#[async_trait]
impl DeploymentTrigger for CountingTrigger {
    async fn trigger(&self, _request: &DeploymentRequest) -> Result<(), DeployError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct RejectingTrigger;

#[async_trait]
impl DeploymentTrigger for RejectingTrigger {
    async fn trigger(&self, _request: &DeploymentRequest) -> Result<(), DeployError> {
        Err(DeployError::TriggerRequestFailed("503 Service Unavailable".to_string()))
    }
}

struct Harness {
    controller: DeploymentController,
    broker: Arc<MemoryBroker>,
    trigger: Arc<CountingTrigger>,
}

impl Harness {
    fn new(mode: DeploymentMode) -> Self {
        let broker = Arc::new(MemoryBroker::new());
        let trigger = Arc::new(CountingTrigger::default());
        let controller = DeploymentController::new(options(mode), trigger.clone(), broker.clone());
        Self {
            controller,
            broker,
            trigger,
        }
    }

    /// Submit a push run and wait until its subscription is bound
    async fn start_push(&self) {
        assert_ok!(self.controller.submit(request()));
        within(async {
            while self.broker.open_subscriptions() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
    }

    async fn settled(&self) -> DeploymentSnapshot {
        within(self.controller.wait_until_settled()).await
    }

    async fn logs_reach(&self, count: usize) -> DeploymentSnapshot {
        within(self.controller.wait_for(|s| s.logs.len() >= count)).await
    }
}

fn options(mode: DeploymentMode) -> ControllerOptions {
    ControllerOptions {
        mode,
        playback: PlaybackOptions::instant(),
        push: PushOptions::default(),
    }
}

fn request() -> DeploymentRequest {
    DeploymentRequest::new(CloudProvider::Aws, AppType::WebApplication, "us-east-1", "alice")
}

async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out waiting for the controller")
}

// =============================== PLAYBACK ========================================= //

#[tokio::test]
async fn test_playback_runs_script_to_success() {
    let harness = Harness::new(DeploymentMode::Playback);
    assert_ok!(harness.controller.submit(request()));

    let snapshot = harness.settled().await;
    assert_eq!(snapshot.state, DeploymentState::Success);
    assert!(!snapshot.is_deploying);
    assert_eq!(snapshot.progress, 100.0);

    let texts: Vec<&str> = snapshot.logs.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts.len(), 24);
    assert_eq!(texts, script(&request()));
    assert_eq!(texts[0], "[INFO] Starting deployment to AWS");
    assert_eq!(texts[23], "[SUCCESS] Deployment completed successfully!");

    let result = snapshot.result.expect("playback produces a result");
    assert_eq!(result.app_url, "https://myapp-us-east-1.aws.example.com");
    assert_eq!(result.monitor_url, "https://grafana-us-east-1.aws.example.com");

    // Playback never calls out
    assert_eq!(harness.trigger.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_playback_progress_is_monotonic() {
    let harness = Harness::new(DeploymentMode::Playback);
    let mut revision = harness.controller.watch();
    assert_ok!(harness.controller.submit(request()));

    let mut last = 0.0;
    within(async {
        loop {
            let snapshot = harness.controller.snapshot();
            assert!(snapshot.progress >= last);
            last = snapshot.progress;
            if !snapshot.is_deploying || revision.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    assert_eq!(last, 100.0);
}

#[tokio::test]
async fn test_new_run_resets_previous_run() {
    let harness = Harness::new(DeploymentMode::Playback);
    assert_ok!(harness.controller.submit(request()));
    let first = harness.settled().await;

    let second_request =
        DeploymentRequest::new(CloudProvider::Gcp, AppType::ApiService, "europe-west1", "");
    let started = assert_ok!(harness.controller.submit(second_request));

    assert_ne!(started.run_id, first.run_id);
    assert_eq!(started.state, DeploymentState::Deploying);
    assert!(started.logs.is_empty());
    assert!(started.result.is_none());
    assert_eq!(started.progress, 0.0);

    let second = harness.settled().await;
    assert_eq!(
        second.result.map(|r| r.app_url),
        Some("https://myapp-europe-west1.gcp.example.com".to_string())
    );
}

#[tokio::test]
async fn test_submit_while_deploying_is_rejected() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    let err = assert_err!(harness.controller.submit(request()));
    assert!(matches!(err, DeployError::AlreadyDeploying));
    assert_eq!(harness.trigger.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_restart_replaces_running_deployment() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;
    let first = harness.controller.snapshot();

    let restarted = assert_ok!(harness.controller.restart(request()));
    assert_ne!(restarted.run_id, first.run_id);
    assert_eq!(restarted.state, DeploymentState::Deploying);

    // Old subscription released, new one bound
    within(async {
        while harness.trigger.calls.load(Ordering::SeqCst) < 2 || harness.broker.open_subscriptions() != 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

// =============================== TEARDOWN ========================================= //

#[tokio::test]
async fn test_destroy_returns_to_idle_and_ignores_stale_events() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    let snapshot = harness.controller.destroy();
    assert_eq!(snapshot.state, DeploymentState::Idle);
    assert!(!snapshot.is_deploying);
    assert!(snapshot.logs.is_empty());
    assert!(snapshot.result.is_none());
    assert_eq!(snapshot.progress, 0.0);

    // The subscription is gone, so late events reach nobody
    let delivered = harness.broker.publish(
        CHANNEL,
        STATUS,
        r#"{"status":"completed","app_url":"https://late.example.com","monitor_url":"https://late.example.com"}"#,
    );
    assert_eq!(delivered, 0);
    assert_eq!(harness.broker.open_subscriptions(), 0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let after = harness.controller.snapshot();
    assert_eq!(after.state, DeploymentState::Idle);
    assert!(after.result.is_none());
}

#[tokio::test]
async fn test_restart_closes_previous_subscription_at_once() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    assert_ok!(harness.controller.restart(request()));

    // The new run has not subscribed yet and the old binding is already gone
    assert_eq!(harness.broker.open_subscriptions(), 0);
    assert_eq!(harness.broker.publish(CHANNEL, STATUS, r#"{"status":"failed"}"#), 0);
}

#[tokio::test]
async fn test_destroy_after_success_clears_result() {
    let harness = Harness::new(DeploymentMode::Playback);
    assert_ok!(harness.controller.submit(request()));
    let settled = harness.settled().await;
    assert_eq!(settled.state, DeploymentState::Success);
    assert!(settled.result.is_some());

    let snapshot = harness.controller.destroy();
    assert_eq!(snapshot.state, DeploymentState::Idle);
    assert!(!snapshot.is_deploying);
    assert!(snapshot.result.is_none());
    assert!(snapshot.logs.is_empty());
    assert_eq!(snapshot.progress, 0.0);
    assert!(snapshot.run_id.is_none());
}

#[tokio::test]
async fn test_destroy_after_error_clears_logs() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;
    harness
        .broker
        .publish(CHANNEL, STATUS, r#"{"status":"error","message":"disk full"}"#);
    let settled = harness.settled().await;
    assert_eq!(settled.state, DeploymentState::Error);
    assert!(!settled.logs.is_empty());

    let snapshot = harness.controller.destroy();
    assert_eq!(snapshot.state, DeploymentState::Idle);
    assert!(snapshot.logs.is_empty());
    assert!(snapshot.error.is_none());
    assert!(snapshot.result.is_none());
    assert_eq!(snapshot.progress, 0.0);
}

#[tokio::test]
async fn test_destroy_stops_playback() {
    let broker = Arc::new(MemoryBroker::new());
    let controller = DeploymentController::new(
        ControllerOptions {
            mode: DeploymentMode::Playback,
            playback: PlaybackOptions {
                min_step_delay: Duration::from_millis(50),
                max_step_delay: Duration::from_millis(50),
            },
            push: PushOptions::default(),
        },
        Arc::new(CountingTrigger::default()),
        broker,
    );

    assert_ok!(controller.submit(request()));
    within(controller.wait_for(|s| !s.logs.is_empty())).await;
    controller.destroy();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.state, DeploymentState::Idle);
    assert!(snapshot.logs.is_empty());
}

#[tokio::test]
async fn test_destroy_when_idle_is_a_no_op() {
    let harness = Harness::new(DeploymentMode::Playback);
    let snapshot = harness.controller.destroy();
    assert_eq!(snapshot.state, DeploymentState::Idle);
    assert!(snapshot.run_id.is_none());
}

// ================================= PUSH =========================================== //

#[tokio::test]
async fn test_trigger_rejection_fails_run() {
    let controller = DeploymentController::new(
        options(DeploymentMode::Push),
        Arc::new(RejectingTrigger),
        Arc::new(MemoryBroker::new()),
    );
    assert_ok!(controller.submit(request()));

    let snapshot = within(controller.wait_until_settled()).await;
    assert_eq!(snapshot.state, DeploymentState::Error);
    assert!(!snapshot.is_deploying);
    assert_eq!(snapshot.logs.len(), 1);
    assert_eq!(snapshot.logs[0].severity, Severity::Error);
    assert!(snapshot.logs[0].text.contains("Failed to trigger deployment"));
}

#[tokio::test]
async fn test_completed_event_succeeds_with_pushed_urls() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    let delivered = harness.broker.publish(
        CHANNEL,
        STATUS,
        r#"{"status":"completed","app_url":"https://shop.example.net","monitor_url":"https://grafana.example.net/d/shop"}"#,
    );
    assert_eq!(delivered, 1);

    let snapshot = harness.settled().await;
    assert_eq!(snapshot.state, DeploymentState::Success);
    assert_eq!(snapshot.progress, 100.0);
    let result = snapshot.result.expect("completed event carries a result");
    assert_eq!(result.app_url, "https://shop.example.net");
    assert_eq!(result.monitor_url, "https://grafana.example.net/d/shop");
}

#[tokio::test]
async fn test_double_encoded_success_event() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    let inner = r#"{"type":"success","appUrl":"https://a.example.net","monitorUrl":"https://m.example.net"}"#;
    let encoded = serde_json::to_string(inner).unwrap();
    harness.broker.publish(CHANNEL, STATUS, &encoded);

    let snapshot = harness.settled().await;
    assert_eq!(snapshot.state, DeploymentState::Success);
    assert_eq!(snapshot.result.map(|r| r.app_url), Some("https://a.example.net".to_string()));
}

#[tokio::test]
async fn test_failed_event_fails_run() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    harness
        .broker
        .publish(CHANNEL, STATUS, r#"{"status":"failed","message":"quota exceeded"}"#);

    let snapshot = harness.settled().await;
    assert_eq!(snapshot.state, DeploymentState::Error);
    assert_eq!(snapshot.error.as_deref(), Some("quota exceeded"));
    assert!(snapshot.result.is_none());
    let last = snapshot.logs.last().unwrap();
    assert_eq!(last.severity, Severity::Error);
    assert!(last.text.contains("quota exceeded"));
}

#[tokio::test]
async fn test_log_events_append_in_order() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    harness
        .broker
        .publish(CHANNEL, LOG, r#"{"message":"Provisioning cluster","progress":40}"#);
    harness
        .broker
        .publish(CHANNEL, LOG, r#"{"message":"Cluster ready","level":"success","progress":60}"#);

    // Trigger line plus the two pushed lines
    let snapshot = harness.logs_reach(3).await;
    assert_eq!(snapshot.state, DeploymentState::Deploying);
    assert_eq!(snapshot.logs[1].text, "[INFO] Provisioning cluster");
    assert_eq!(snapshot.logs[2].text, "[SUCCESS] Cluster ready");
    assert_eq!(snapshot.progress, 60.0);
}

#[tokio::test]
async fn test_malformed_log_event_is_not_fatal() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    harness.broker.publish(CHANNEL, LOG, "not json at all");

    let snapshot = harness.logs_reach(2).await;
    assert_eq!(snapshot.state, DeploymentState::Deploying);
    let errors: Vec<_> = snapshot
        .logs
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 1);

    // The run keeps listening
    harness
        .broker
        .publish(CHANNEL, STATUS, r#"{"status":"failed","message":"later"}"#);
    assert_eq!(harness.settled().await.state, DeploymentState::Error);
}

#[tokio::test]
async fn test_malformed_status_event_fails_run() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    harness.broker.publish(CHANNEL, STATUS, r#"{"status":"completed"}"#);

    let snapshot = harness.settled().await;
    assert_eq!(snapshot.state, DeploymentState::Error);
    let errors = snapshot
        .logs
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn test_events_after_terminal_are_ignored() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    harness
        .broker
        .publish(CHANNEL, STATUS, r#"{"status":"failed","message":"boom"}"#);
    let failed = harness.settled().await;

    // The run unsubscribes once it ends
    within(async {
        while harness.broker.open_subscriptions() != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    harness.broker.publish(
        CHANNEL,
        STATUS,
        r#"{"status":"completed","app_url":"https://x.example.com","monitor_url":"https://y.example.com"}"#,
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    let after = harness.controller.snapshot();
    assert_eq!(after.state, DeploymentState::Error);
    assert_eq!(after.logs.len(), failed.logs.len());
    assert!(after.result.is_none());
}

#[tokio::test]
async fn test_no_terminal_event_stays_deploying() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = harness.controller.snapshot();
    assert_eq!(snapshot.state, DeploymentState::Deploying);
    assert!(snapshot.is_deploying);
    assert_eq!(snapshot.logs.len(), 1);
    assert!(snapshot.logs[0].text.contains("Deployment triggered for alice"));
}

#[tokio::test]
async fn test_transport_error_is_not_fatal() {
    let harness = Harness::new(DeploymentMode::Push);
    harness.start_push().await;

    assert_eq!(harness.broker.fail(CHANNEL, "connection reset"), 1);

    let snapshot = harness.logs_reach(2).await;
    assert_eq!(snapshot.state, DeploymentState::Deploying);
    assert_eq!(snapshot.logs[1].severity, Severity::Error);
    assert!(snapshot.logs[1].text.contains("connection reset"));
}
