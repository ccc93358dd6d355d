//! Scripted local playback of a deployment

use std::time::Duration;

use rand::Rng;
use tracing::{debug, info};

use crate::deploy::controller::RunContext;
use crate::models::deployment::{DeploymentRequest, DeploymentResult};
use crate::models::log::LogEntry;

/// Playback timing
#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    /// Shortest wait before a step
    pub min_step_delay: Duration,

    /// Longest wait before a step
    pub max_step_delay: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            min_step_delay: Duration::from_millis(500),
            max_step_delay: Duration::from_millis(1500),
        }
    }
}

impl PlaybackOptions {
    /// No waiting between steps
    pub fn instant() -> Self {
        Self {
            min_step_delay: Duration::ZERO,
            max_step_delay: Duration::ZERO,
        }
    }

    /// Uniformly random delay within the configured bounds
    pub fn step_delay(&self) -> Duration {
        let min = self.min_step_delay.as_millis() as u64;
        let max = self.max_step_delay.as_millis() as u64;
        if max <= min {
            return self.min_step_delay;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Log lines played back for a request, in order
pub fn script(request: &DeploymentRequest) -> Vec<String> {
    vec![
        format!("[INFO] Starting deployment to {}", request.cloud_provider),
        format!("[INFO] Application type: {}", request.app_type),
        format!("[INFO] Target region: {}", request.region),
        "[INFO] Initializing Terraform...".to_string(),
        "[SUCCESS] Terraform initialized successfully".to_string(),
        "[INFO] Planning infrastructure changes...".to_string(),
        "[SUCCESS] Plan: 12 to add, 0 to change, 0 to destroy".to_string(),
        "[INFO] Applying infrastructure changes...".to_string(),
        "[INFO] Creating VPC and networking components...".to_string(),
        "[SUCCESS] VPC created: vpc-abc123def456".to_string(),
        "[INFO] Provisioning Kubernetes cluster...".to_string(),
        "[INFO] Installing cluster autoscaler...".to_string(),
        "[SUCCESS] Kubernetes cluster ready".to_string(),
        "[INFO] Building container image...".to_string(),
        "[SUCCESS] Image built: myapp:v1.2.3".to_string(),
        "[INFO] Pushing to container registry...".to_string(),
        "[SUCCESS] Image pushed successfully".to_string(),
        "[INFO] Deploying application to Kubernetes...".to_string(),
        "[INFO] Creating deployment, service, and ingress...".to_string(),
        "[SUCCESS] Application deployed successfully".to_string(),
        "[INFO] Setting up monitoring and logging...".to_string(),
        "[SUCCESS] Grafana dashboard configured".to_string(),
        "[SUCCESS] Kibana logging setup complete".to_string(),
        "[SUCCESS] Deployment completed successfully!".to_string(),
    ]
}

/// Progress after `completed` of `total` steps
pub fn step_progress(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    completed as f64 / total as f64 * 100.0
}

/// Play the script back into a run, then finish it successfully
pub(crate) async fn run(ctx: RunContext, request: DeploymentRequest, options: PlaybackOptions) {
    let steps = script(&request);
    let total = steps.len();
    info!(run_id = %ctx.id(), "Playing back {} deployment steps", total);

    for (index, line) in steps.into_iter().enumerate() {
        tokio::time::sleep(options.step_delay()).await;

        if !ctx.append(LogEntry::new(line), Some(step_progress(index + 1, total))) {
            debug!(run_id = %ctx.id(), "Run is no longer live, stopping playback");
            return;
        }
    }

    ctx.succeed(DeploymentResult::simulated(&request), None);
}
