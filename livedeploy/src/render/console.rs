//! Console renderer for `--deploy` runs

use chrono::Local;
use colored::{ColoredString, Colorize};

use crate::deploy::controller::{DeploymentController, DeploymentSnapshot};
use crate::deploy::fsm::DeploymentState;
use crate::models::deployment::DeploymentResult;
use crate::models::log::{LogEntry, Severity};

fn paint(text: &str, severity: Severity) -> ColoredString {
    match severity {
        Severity::Success => text.green(),
        Severity::Error => text.red(),
        Severity::Info => text.cyan(),
        Severity::Plain => text.white(),
    }
}

/// One console line: local time followed by the colored text
pub fn format_entry(entry: &LogEntry) -> String {
    let time = entry.timestamp.with_timezone(&Local).format("%H:%M:%S");
    format!("{} {}", time.to_string().dimmed(), paint(&entry.text, entry.severity))
}

/// Summary printed once the run settles
pub fn format_summary(snapshot: &DeploymentSnapshot) -> Vec<String> {
    match snapshot.state {
        DeploymentState::Success => match &snapshot.result {
            Some(result) => format_result(result),
            None => vec!["Deployment succeeded".green().bold().to_string()],
        },
        DeploymentState::Error => {
            let reason = snapshot.error.as_deref().unwrap_or("unknown error");
            vec![format!("{} {}", "Deployment failed:".red().bold(), reason)]
        }
        DeploymentState::Deploying | DeploymentState::Idle => Vec::new(),
    }
}

fn format_result(result: &DeploymentResult) -> Vec<String> {
    let mut lines = vec![
        "Deployment succeeded".green().bold().to_string(),
        format!("  {:<12}{}", "Application", result.app_url.underline()),
        format!("  {:<12}{}", "Monitoring", result.monitor_url.underline()),
    ];
    if let Some(logs_url) = &result.logs_url {
        lines.push(format!("  {:<12}{}", "Logs", logs_url.underline()));
    }
    lines
}

/// Print log lines as they arrive until the current run settles.
///
/// Returns the settled snapshot.
pub async fn follow(controller: &DeploymentController) -> DeploymentSnapshot {
    let mut revision = controller.watch();
    let mut printed = 0;

    loop {
        let snapshot = controller.snapshot();
        // A new run restarts the log
        if snapshot.logs.len() < printed {
            printed = 0;
        }
        for entry in &snapshot.logs[printed..] {
            println!("{}", format_entry(entry));
        }
        printed = snapshot.logs.len();

        if !snapshot.is_deploying || revision.changed().await.is_err() {
            for line in format_summary(&snapshot) {
                println!("{}", line);
            }
            return snapshot;
        }
    }
}
