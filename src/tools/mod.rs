//! Tool calls requested by the assistant
//!
//! The declared tool set is closed: [`Tool`] names every tool the session
//! advertises, and [`ToolDispatcher`] executes one call at a time, always
//! producing a [`ToolResult`].

mod catalog;
mod dispatcher;
mod events;
mod host;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub use catalog::{NoteMode, Peripheral, PeripheralAction, Theme, Tool, ToolDeclaration, declarations};
pub use dispatcher::{DEFAULT_LOCATION_TIMEOUT, DEFAULT_SEARCH_URL, ToolDispatcher};
pub use events::{HostEvent, SentMessage, SystemMetrics};
pub use host::{BatteryStatus, Coordinates, HostServices, SystemHost};

/// A tool invocation requested by the remote side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, echoed in the response
    pub id: String,
    /// Tool name
    pub name: String,
    /// Named arguments
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    /// Create a call
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Outcome of one tool call
///
/// Serializes either as the success payload itself or as `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResult {
    /// Failure captured from the tool
    Failure {
        /// Error message
        error: String,
    },
    /// Success payload
    Success(Value),
}

impl ToolResult {
    /// The default `{"status": "ok"}` payload
    #[must_use]
    pub fn ok() -> Self {
        Self::status("ok")
    }

    /// A `{"status": ...}` payload
    #[must_use]
    pub fn status(status: impl Into<String>) -> Self {
        Self::Success(json!({ "status": status.into() }))
    }

    /// An error-shaped result
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    /// Whether the call succeeded
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Success payload, if any
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure { .. } => None,
        }
    }

    /// Error message, if any
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure { error } => Some(error),
            Self::Success(_) => None,
        }
    }

    /// Payload sent back to the remote side: `{"result": <result>}`
    #[must_use]
    pub fn to_response(&self) -> Value {
        json!({ "result": self })
    }
}

/// Failures inside a tool's effect
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// Missing or malformed argument
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Host query or action failed
    #[error("{0}")]
    Host(String),

    /// Host query did not answer in time
    #[error("{0} timed out")]
    Timeout(String),

    /// Capability not available on this host
    #[error("{0} unavailable")]
    Unavailable(String),
}
