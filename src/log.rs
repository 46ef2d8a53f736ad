//! Observational log entries surfaced to the presentation layer
//!
//! Entries are append-only; the core emits them and never reads them back.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Who produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    /// Typed by the user
    User,
    /// Produced by the assistant
    Ai,
    /// Lifecycle notices from the core
    System,
    /// Failures
    Error,
}

/// Optional rendering hint for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Plain conversational text
    Text,
    /// A tool invocation
    Tool,
    /// An error report
    Error,
}

/// A single log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Unique entry ID (tool entries reuse the call ID)
    pub id: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Producer of the entry
    pub source: LogSource,
    /// Human-readable message
    pub message: String,
    /// Rendering hint
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<LogKind>,
}

impl LogEntry {
    /// Create an entry with a fresh ID and the current timestamp
    #[must_use]
    pub fn new(source: LogSource, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source,
            message: message.into(),
            kind: None,
        }
    }

    /// System lifecycle entry
    #[must_use]
    pub fn system(message: impl Into<String>) -> Self {
        Self::new(LogSource::System, message)
    }

    /// Error entry
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogSource::Error, message)
    }

    /// User message entry
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(LogSource::User, message)
    }

    /// Assistant message entry
    #[must_use]
    pub fn ai(message: impl Into<String>) -> Self {
        Self::new(LogSource::Ai, message)
    }

    /// Return this entry with a rendering hint
    #[must_use]
    pub const fn with_kind(mut self, kind: LogKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Return this entry with an explicit ID
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}
