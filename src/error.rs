//! Error types for the Aryan session core

use thiserror::Error;

/// Result type alias for Aryan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the session core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection to the remote session failed
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Inbound speech buffer could not be decoded
    #[error("playback decode error: {0}")]
    Decode(String),

    /// Tool execution error
    #[error("tool error: {0}")]
    Tool(String),

    /// Text channel exchange error
    #[error("text channel error: {0}")]
    Text(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Failures that drive the reconnect/backoff policy
///
/// Every variant is retried the same way, including a missing credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// No outbound network route
    #[error("No internet connection")]
    Offline,

    /// API key absent or empty
    #[error("API key is missing.")]
    MissingCredential,

    /// Microphone or speaker could not be acquired
    #[error("audio device unavailable: {0}")]
    Audio(String),

    /// Transport failed to open or dropped
    #[error("{0}")]
    Transport(String),
}
