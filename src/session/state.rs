//! Session lifecycle states

use serde::Serialize;

/// Lifecycle state of the realtime session
///
/// Owned exclusively by the session controller; observers only see copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session open and no attempt pending
    #[default]
    Disconnected,
    /// An attempt is in flight or a retry is scheduled
    Connecting,
    /// The remote session is open and audio is flowing
    Connected,
    /// Retries exhausted; terminal until the next `connect()`
    Error,
}

impl SessionState {
    /// Whether a connection attempt may start from this state
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}
