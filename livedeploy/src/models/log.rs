//! Deployment log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a log line, derived from its leading tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
    Plain,
}

impl Severity {
    const TAGS: [(&'static str, Severity); 3] = [
        ("[INFO]", Severity::Info),
        ("[SUCCESS]", Severity::Success),
        ("[ERROR]", Severity::Error),
    ];

    /// Classify a line by its tag prefix
    pub fn classify(text: &str) -> Severity {
        let text = text.trim_start();
        Self::TAGS
            .iter()
            .find(|(tag, _)| text.starts_with(tag))
            .map(|(_, severity)| *severity)
            .unwrap_or(Severity::Plain)
    }

    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Severity::Info => Some("[INFO]"),
            Severity::Success => Some("[SUCCESS]"),
            Severity::Error => Some("[ERROR]"),
            Severity::Plain => None,
        }
    }
}

/// A single line in a run's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub text: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            severity: Severity::classify(&text),
            text,
            timestamp: Utc::now(),
        }
    }

    pub fn info(message: impl AsRef<str>) -> Self {
        Self::tagged(Severity::Info, message.as_ref())
    }

    pub fn success(message: impl AsRef<str>) -> Self {
        Self::tagged(Severity::Success, message.as_ref())
    }

    pub fn error(message: impl AsRef<str>) -> Self {
        Self::tagged(Severity::Error, message.as_ref())
    }

    fn tagged(severity: Severity, message: &str) -> Self {
        match severity.tag() {
            Some(tag) => Self::new(format!("{} {}", tag, message)),
            None => Self::new(message),
        }
    }

    /// Text without the severity tag
    pub fn message(&self) -> &str {
        let trimmed = self.text.trim_start();
        match self.severity.tag() {
            Some(tag) => trimmed.strip_prefix(tag).unwrap_or(trimmed).trim_start(),
            None => &self.text,
        }
    }
}
