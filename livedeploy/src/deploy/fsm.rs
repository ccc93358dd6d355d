//! Finite State Machine for a simulated deployment run

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    /// No run, nothing to show
    Idle,

    /// A run is in progress
    Deploying,

    /// Run finished successfully
    Success,

    /// Run failed
    Error,
}

impl DeploymentState {
    /// Whether the state ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentState::Success | DeploymentState::Error)
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// A request was submitted
    Submit,

    /// The run completed successfully
    Succeed,

    /// The run failed
    Fail(String),

    /// Tear the run down
    Destroy,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: DeploymentState::Idle,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentState, DeployError> {
        let new_state = match (&self.state, &event) {
            // Destroy is accepted from anywhere
            (_, DeploymentEvent::Destroy) => {
                self.error = None;
                DeploymentState::Idle
            }

            // A new run may start from any non-running state
            (DeploymentState::Idle, DeploymentEvent::Submit)
            | (DeploymentState::Success, DeploymentEvent::Submit)
            | (DeploymentState::Error, DeploymentEvent::Submit) => {
                self.error = None;
                DeploymentState::Deploying
            }

            (DeploymentState::Deploying, DeploymentEvent::Succeed) => DeploymentState::Success,
            (DeploymentState::Deploying, DeploymentEvent::Fail(err)) => {
                self.error = Some(err.clone());
                DeploymentState::Error
            }

            (DeploymentState::Deploying, DeploymentEvent::Submit) => {
                return Err(DeployError::AlreadyDeploying);
            }

            // Invalid transitions
            (state, event) => {
                return Err(DeployError::InvalidTransition(format!(
                    "{:?} -> {:?}",
                    state, event
                )));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
