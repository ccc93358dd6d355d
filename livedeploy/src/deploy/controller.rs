//! Deployment status controller
//!
//! Owns the lifecycle of a single simulated deployment run and the state a
//! rendering layer reads: `{ state, progress, logs, result }`. A run is driven
//! either by local playback of a scripted log or by events pushed over a
//! channel after an outbound trigger call.
//!
//! Every run gets a fresh id. The run task only mutates state through a
//! [`RunContext`] carrying that id, and every mutation is discarded once the
//! id is stale or the run has reached a terminal state. Together with aborting
//! the task on teardown this keeps events from an old run out of a new one.

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use crate::deploy::playback::{self, PlaybackOptions};
use crate::deploy::push::{self, PushOptions};
use crate::errors::DeployError;
use crate::http::trigger::DeploymentTrigger;
use crate::models::deployment::{DeploymentRequest, DeploymentResult};
use crate::models::log::LogEntry;
use crate::pubsub::subscription::PushSubscriber;

/// Source of updates for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Scripted log played back locally
    #[default]
    Playback,

    /// Outbound trigger plus pushed events
    Push,
}

impl FromStr for DeploymentMode {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "playback" | "local" => Ok(DeploymentMode::Playback),
            "push" | "external" => Ok(DeploymentMode::Push),
            _ => Err(DeployError::ConfigError(format!("Invalid deployment mode: {}", s))),
        }
    }
}

/// Controller options
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Mode used by [`DeploymentController::submit`]
    pub mode: DeploymentMode,

    pub playback: PlaybackOptions,

    pub push: PushOptions,
}

/// Point-in-time view of the controller for rendering
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentSnapshot {
    pub run_id: Option<Uuid>,
    pub mode: Option<DeploymentMode>,
    pub state: DeploymentState,
    pub is_deploying: bool,
    pub progress: f64,
    pub logs: Vec<LogEntry>,
    pub result: Option<DeploymentResult>,
    pub request: Option<DeploymentRequest>,
    pub error: Option<String>,
}

/// State of the current run
#[derive(Debug, Default)]
struct RunState {
    run_id: Option<Uuid>,
    mode: Option<DeploymentMode>,
    fsm: DeploymentFsm,
    logs: Vec<LogEntry>,
    progress: f64,
    result: Option<DeploymentResult>,
    request: Option<DeploymentRequest>,
}

impl RunState {
    fn snapshot(&self) -> DeploymentSnapshot {
        let state = self.fsm.state();
        DeploymentSnapshot {
            run_id: self.run_id,
            mode: self.mode,
            state,
            is_deploying: state == DeploymentState::Deploying,
            progress: self.progress,
            logs: self.logs.clone(),
            result: self.result.clone(),
            request: self.request.clone(),
            error: self.fsm.error().map(str::to_string),
        }
    }

    fn is_live(&self, id: Uuid) -> bool {
        self.run_id == Some(id) && self.fsm.state() == DeploymentState::Deploying
    }

    fn raise_progress(&mut self, progress: f64) {
        let progress = progress.clamp(0.0, 100.0);
        if progress > self.progress {
            self.progress = progress;
        }
    }
}

#[derive(Default)]
struct Inner {
    run: RunState,
    task: Option<JoinHandle<()>>,
    /// Closes the run's subscription, once it has one
    subscription: Option<CancellationToken>,
}

impl Inner {
    /// Stop the current run task. The subscription is closed before this
    /// returns; the aborted future is dropped later by the runtime.
    fn stop_task(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn touch(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// Handle a run task uses to report progress.
///
/// All methods return whether the run is still live after the call. Calls on
/// a stale or finished run change nothing.
#[derive(Clone)]
pub struct RunContext {
    id: Uuid,
    shared: Arc<Shared>,
}

impl RunContext {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Append a log line, optionally raising progress
    pub fn append(&self, entry: LogEntry, progress: Option<f64>) -> bool {
        self.mutate(|run| {
            run.logs.push(entry);
            if let Some(progress) = progress {
                run.raise_progress(progress);
            }
            true
        })
    }

    /// Hand the controller a way to close the run's subscription on teardown.
    /// A run that is no longer live gets its subscription closed at once.
    pub fn attach_subscription(&self, cancel: CancellationToken) -> bool {
        let mut inner = self.shared.lock();
        if !inner.run.is_live(self.id) {
            cancel.cancel();
            return false;
        }
        inner.subscription = Some(cancel);
        true
    }

    /// Finish the run successfully
    pub fn succeed(&self, result: DeploymentResult, entry: Option<LogEntry>) -> bool {
        self.mutate(|run| {
            if let Some(entry) = entry {
                run.logs.push(entry);
            }
            run.result = Some(result);
            run.progress = 100.0;
            if let Err(e) = run.fsm.process(DeploymentEvent::Succeed) {
                warn!("Unexpected transition: {}", e);
            }
            false
        })
    }

    /// Finish the run with an error
    pub fn fail(&self, entry: LogEntry, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.mutate(|run| {
            run.logs.push(entry);
            run.progress = 100.0;
            if let Err(e) = run.fsm.process(DeploymentEvent::Fail(reason)) {
                warn!("Unexpected transition: {}", e);
            }
            false
        })
    }

    fn mutate<F>(&self, apply: F) -> bool
    where
        F: FnOnce(&mut RunState) -> bool,
    {
        let live = {
            let mut inner = self.shared.lock();
            if !inner.run.is_live(self.id) {
                debug!(run_id = %self.id, "Dropping update for a run that is no longer live");
                return false;
            }
            apply(&mut inner.run)
        };
        self.shared.touch();
        live
    }
}

/// The deployment status controller
pub struct DeploymentController {
    shared: Arc<Shared>,
    options: ControllerOptions,
    trigger: Arc<dyn DeploymentTrigger>,
    subscriber: Arc<dyn PushSubscriber>,
}

impl DeploymentController {
    pub fn new(
        options: ControllerOptions,
        trigger: Arc<dyn DeploymentTrigger>,
        subscriber: Arc<dyn PushSubscriber>,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                revision,
            }),
            options,
            trigger,
            subscriber,
        }
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Current state for rendering
    pub fn snapshot(&self) -> DeploymentSnapshot {
        self.shared.lock().run.snapshot()
    }

    pub fn state(&self) -> DeploymentState {
        self.shared.lock().run.fsm.state()
    }

    /// Receiver that changes whenever the snapshot does
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Start a run in the configured mode.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: DeploymentRequest) -> Result<DeploymentSnapshot, DeployError> {
        self.submit_with_mode(request, self.options.mode)
    }

    /// Start a run in the given mode. Fails while another run is deploying.
    pub fn submit_with_mode(
        &self,
        request: DeploymentRequest,
        mode: DeploymentMode,
    ) -> Result<DeploymentSnapshot, DeployError> {
        validate(&request, mode)?;

        let snapshot = {
            let mut inner = self.shared.lock();
            if inner.run.fsm.state() == DeploymentState::Deploying {
                return Err(DeployError::AlreadyDeploying);
            }
            self.start_locked(&mut inner, request, mode)?
        };
        self.shared.touch();
        Ok(snapshot)
    }

    /// Tear down whatever is running and start a new run in the configured mode
    pub fn restart(&self, request: DeploymentRequest) -> Result<DeploymentSnapshot, DeployError> {
        self.restart_with_mode(request, self.options.mode)
    }

    /// Tear down whatever is running and start a new run in the given mode
    pub fn restart_with_mode(
        &self,
        request: DeploymentRequest,
        mode: DeploymentMode,
    ) -> Result<DeploymentSnapshot, DeployError> {
        validate(&request, mode)?;

        let snapshot = {
            let mut inner = self.shared.lock();
            inner.stop_task();
            inner.run.fsm.process(DeploymentEvent::Destroy)?;
            self.start_locked(&mut inner, request, mode)?
        };
        self.shared.touch();
        Ok(snapshot)
    }

    /// Tear down the current run and return to idle.
    ///
    /// The run task is aborted and its subscription released before this
    /// returns; nothing from the old run can change state afterwards.
    pub fn destroy(&self) -> DeploymentSnapshot {
        let snapshot = {
            let mut inner = self.shared.lock();
            inner.stop_task();

            if let Some(run_id) = inner.run.run_id {
                info!(run_id = %run_id, "Destroying deployment");
            }
            inner.run = RunState::default();
            inner.run.snapshot()
        };
        self.shared.touch();
        snapshot
    }

    /// Wait until `predicate` holds for the snapshot
    pub async fn wait_for<F>(&self, predicate: F) -> DeploymentSnapshot
    where
        F: Fn(&DeploymentSnapshot) -> bool,
    {
        let mut revision = self.watch();
        loop {
            let snapshot = self.snapshot();
            if predicate(&snapshot) {
                return snapshot;
            }
            if revision.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    /// Wait until the current run leaves `Deploying`
    pub async fn wait_until_settled(&self) -> DeploymentSnapshot {
        self.wait_for(|snapshot| !snapshot.is_deploying).await
    }

    fn start_locked(
        &self,
        inner: &mut Inner,
        request: DeploymentRequest,
        mode: DeploymentMode,
    ) -> Result<DeploymentSnapshot, DeployError> {
        inner.stop_task();
        inner.run.fsm.process(DeploymentEvent::Submit)?;

        let run_id = Uuid::new_v4();
        inner.run.run_id = Some(run_id);
        inner.run.mode = Some(mode);
        inner.run.logs.clear();
        inner.run.progress = 0.0;
        inner.run.result = None;
        inner.run.request = Some(request.clone());

        info!(
            run_id = %run_id,
            "Starting {:?} deployment to {} ({}) for {}",
            mode, request.cloud_provider, request.region, request.app_type
        );

        let ctx = RunContext {
            id: run_id,
            shared: self.shared.clone(),
        };

        let task = match mode {
            DeploymentMode::Playback => {
                tokio::spawn(playback::run(ctx, request, self.options.playback.clone()))
            }
            DeploymentMode::Push => tokio::spawn(push::run(
                ctx,
                request,
                self.options.push.clone(),
                self.trigger.clone(),
                self.subscriber.clone(),
            )),
        };
        inner.task = Some(task);

        Ok(inner.run.snapshot())
    }
}

impl Drop for DeploymentController {
    fn drop(&mut self) {
        self.shared.lock().stop_task();
    }
}

fn validate(request: &DeploymentRequest, mode: DeploymentMode) -> Result<(), DeployError> {
    request.validate()?;
    if mode == DeploymentMode::Push {
        request.validate_username()?;
    }
    Ok(())
}
