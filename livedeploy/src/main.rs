//! livedeploy - Entry Point
//!
//! Serves the deployment controller over a local HTTP API, or runs a single
//! deployment in the terminal with `--deploy`.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use livedeploy::app::options::AppOptions;
use livedeploy::app::run::{build_controller, run};
use livedeploy::deploy::fsm::DeploymentState;
use livedeploy::errors::DeployError;
use livedeploy::filesys::file::File;
use livedeploy::logs::{init_logging, LogOptions};
use livedeploy::models::catalog::{AppType, CloudProvider};
use livedeploy::models::deployment::DeploymentRequest;
use livedeploy::render::console::follow;
use livedeploy::storage::settings::Settings;
use livedeploy::utils::version_info;

use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "livedeploy.json";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to serialize version: {e}"),
        }
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let config_path = cli_args
        .get("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);
    let settings_file = File::new(config_path);

    if cli_args.contains_key("init-config") {
        return match settings_file.write_json(&Settings::default()).await {
            Ok(()) => {
                println!("Wrote default settings to {}", config_path);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Unable to write settings file: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let settings = match load_settings(&settings_file, &cli_args).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to load settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    let one_shot = cli_args.contains_key("deploy");

    // Initialize logging. Console runs keep stdout for the deployment log.
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        stdout: !one_shot,
        log_dir: settings.log_dir.clone().map(Into::into),
        json_format: settings.log_json,
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings);

    if one_shot {
        return match deploy_once(&options, &cli_args).await {
            Ok(DeploymentState::Success) => ExitCode::SUCCESS,
            Ok(_) => ExitCode::FAILURE,
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    // Run the server
    info!("Running livedeploy with options: {:?}", options);
    match run(version.version, options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run livedeploy: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn load_settings(
    settings_file: &File,
    cli_args: &HashMap<String, String>,
) -> Result<Settings, DeployError> {
    let mut settings = if settings_file.exists().await {
        settings_file.read_json::<Settings>().await?
    } else {
        Settings::default()
    };

    if let Some(mode) = cli_args.get("mode") {
        settings.mode = mode.parse()?;
    }
    if let Some(port) = cli_args.get("port") {
        settings.server.port = port
            .parse()
            .map_err(|_| DeployError::ConfigError(format!("Invalid port: {}", port)))?;
    }
    Ok(settings)
}

/// Run a single deployment and render it in the terminal
async fn deploy_once(
    options: &AppOptions,
    cli_args: &HashMap<String, String>,
) -> Result<DeploymentState, DeployError> {
    let request = request_from_args(cli_args)?;
    let controller = build_controller(options)?;
    controller.submit(request)?;

    let settled = tokio::select! {
        snapshot = follow(&controller) => snapshot,
        _ = await_shutdown_signal() => controller.destroy(),
    };
    Ok(settled.state)
}

fn request_from_args(cli_args: &HashMap<String, String>) -> Result<DeploymentRequest, DeployError> {
    let provider: CloudProvider = match cli_args.get("provider") {
        Some(provider) => provider.parse()?,
        None => CloudProvider::Aws,
    };
    let app_type: AppType = match cli_args.get("app-type") {
        Some(app_type) => app_type.parse()?,
        None => AppType::WebApplication,
    };
    let region = cli_args
        .get("region")
        .cloned()
        .unwrap_or_else(|| provider.default_region().to_string());
    let username = cli_args.get("username").cloned().unwrap_or_default();

    Ok(DeploymentRequest::new(provider, app_type, region, username))
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
        }
        info!("Ctrl+C received, shutting down...");
    }
}
