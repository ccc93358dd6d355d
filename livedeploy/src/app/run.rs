//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions, TransportOptions};
use crate::deploy::controller::DeploymentController;
use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::http::trigger::{DeploymentTrigger, WebhookTrigger};
use crate::pubsub::mqtt::MqttSubscriber;
use crate::pubsub::pusher::PusherSubscriber;
use crate::pubsub::subscription::PushSubscriber;
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Run the deployment service until `shutdown_signal` resolves
pub async fn run(
    version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeployError> {
    info!("Initializing livedeploy {}...", version);

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start livedeploy: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

/// Build a controller with the trigger and subscriber the options select
pub fn build_controller(options: &AppOptions) -> Result<DeploymentController, DeployError> {
    let http_client = HttpClient::new(options.trigger.timeout)?;
    let trigger: Arc<dyn DeploymentTrigger> =
        Arc::new(WebhookTrigger::new(http_client, options.trigger.url.clone()));

    let subscriber: Arc<dyn PushSubscriber> = match &options.transport {
        TransportOptions::Pusher(pusher) => Arc::new(PusherSubscriber::new(pusher.clone())),
        TransportOptions::Mqtt(address) => Arc::new(MqttSubscriber::new(address.clone())),
    };

    Ok(DeploymentController::new(
        options.controller.clone(),
        trigger,
        subscriber,
    ))
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), DeployError> {
    info!("Initializing deployment controller...");
    let controller = Arc::new(build_controller(options)?);
    shutdown_manager.with_controller(controller.clone())?;

    init_server(options, controller, shutdown_manager, shutdown_tx.subscribe()).await
}

async fn init_server(
    options: &AppOptions,
    controller: Arc<DeploymentController>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DeployError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(controller);
    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    controller: Option<Arc<DeploymentController>>,
    server_handle: Option<JoinHandle<Result<(), DeployError>>>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            controller: None,
            server_handle: None,
        }
    }

    fn with_controller(&mut self, controller: Arc<DeploymentController>) -> Result<(), DeployError> {
        if self.controller.is_some() {
            return Err(DeployError::ShutdownError("controller already set".to_string()));
        }
        self.controller = Some(controller);
        Ok(())
    }

    fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), DeployError>>,
    ) -> Result<(), DeployError> {
        if self.server_handle.is_some() {
            return Err(DeployError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), DeployError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), DeployError> {
        info!("Shutting down livedeploy...");

        // 1. Server stops taking requests
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| DeployError::ShutdownError(e.to_string()))??;
        }

        // 2. Running deployment and its subscription
        if let Some(controller) = self.controller.take() {
            controller.destroy();
        }

        info!("Shutdown complete");
        Ok(())
    }
}
