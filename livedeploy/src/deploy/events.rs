//! Decoding of events pushed over the deployment channel

use serde_json::{Map, Value};

use crate::errors::DeployError;
use crate::models::deployment::DeploymentResult;
use crate::models::log::{LogEntry, Severity};

/// Which kind of binding an event arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRole {
    /// Progress and log lines only
    Log,

    /// May carry a terminal status
    Status,
}

/// A decoded push event
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Informational update, no state change
    Log {
        entry: LogEntry,
        progress: Option<f64>,
    },

    /// The remote deployment failed
    Failed { message: String },

    /// The remote deployment completed
    Completed {
        result: DeploymentResult,
        message: Option<String>,
    },
}

const SUCCESS_STATUSES: [&str; 2] = ["completed", "success"];
const FAILURE_STATUSES: [&str; 2] = ["failed", "error"];

/// Decode a raw event payload.
///
/// The payload is either a JSON object or a JSON string that itself encodes
/// an object. The discriminator is read from `status`, `type` or `kind`.
pub fn decode(data: &str) -> Result<PushEvent, DeployError> {
    let object = parse_object(data)?;

    let status = discriminator(&object).map(|s| s.to_lowercase());
    let message = string_field(&object, &["message", "log", "error"]);

    match status.as_deref() {
        Some(s) if SUCCESS_STATUSES.contains(&s) => {
            let app_url = string_field(&object, &["app_url", "appUrl"]).ok_or_else(|| {
                DeployError::EventParseFailed("success event without app_url".to_string())
            })?;
            let monitor_url =
                string_field(&object, &["monitor_url", "monitorUrl"]).ok_or_else(|| {
                    DeployError::EventParseFailed("success event without monitor_url".to_string())
                })?;

            Ok(PushEvent::Completed {
                result: DeploymentResult {
                    app_url,
                    monitor_url,
                    logs_url: string_field(&object, &["logs_url", "logsUrl"]),
                    status,
                },
                message,
            })
        }
        Some(s) if FAILURE_STATUSES.contains(&s) => Ok(PushEvent::Failed {
            message: message.unwrap_or_else(|| "Deployment failed".to_string()),
        }),
        _ => {
            let text = message.or(status).ok_or_else(|| {
                DeployError::EventParseFailed("event carries neither a message nor a status".to_string())
            })?;
            let level = string_field(&object, &["level", "severity"]);

            Ok(PushEvent::Log {
                entry: tag_line(&text, level.as_deref()),
                progress: object.get("progress").and_then(Value::as_f64),
            })
        }
    }
}

fn parse_object(data: &str) -> Result<Map<String, Value>, DeployError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| DeployError::EventParseFailed(format!("payload is not JSON: {}", e)))?;

    // Some publishers double encode the payload
    let value = match value {
        Value::String(inner) => serde_json::from_str(&inner).map_err(|e| {
            DeployError::EventParseFailed(format!("encoded payload is not JSON: {}", e))
        })?,
        other => other,
    };

    match value {
        Value::Object(object) => Ok(object),
        other => Err(DeployError::EventParseFailed(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn discriminator(object: &Map<String, Value>) -> Option<String> {
    string_field(object, &["status", "type", "kind"])
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn tag_line(text: &str, level: Option<&str>) -> LogEntry {
    if Severity::classify(text) != Severity::Plain {
        return LogEntry::new(text);
    }
    match level.map(str::to_lowercase).as_deref() {
        Some("success") => LogEntry::success(text),
        Some("error") => LogEntry::error(text),
        Some("plain") => LogEntry::new(text),
        _ => LogEntry::info(text),
    }
}
