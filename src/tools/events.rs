//! Notifications from tool effects to the presentation layer
//!
//! Tools never touch the UI directly; they publish a [`HostEvent`] on a
//! broadcast channel and the collaborator decides what to do with it.

use serde::{Deserialize, Serialize};

use super::catalog::{Peripheral, PeripheralAction, Theme};

/// Channel capacity for host events
pub(crate) const CHANNEL_CAPACITY: usize = 64;

/// Simulated diagnostics payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// CPU load, e.g. `"23%"`
    pub cpu: String,
    /// Memory use, e.g. `"4821MB / 16GB"`
    pub ram: String,
    /// Temperature, e.g. `"39°C"`
    pub temp: String,
    /// Running process names
    pub processes: Vec<String>,
}

/// Record of a message handed to the messenger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Contact name or number
    pub recipient: String,
    /// Message body
    pub content: String,
    /// RFC 3339 send time
    pub timestamp: String,
}

/// Request from a tool to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// Switch the theme
    ThemeChange { mode: Theme },
    /// Set screen brightness; the receiver clamps to its own range
    BrightnessChange { level: f64 },
    /// Begin the shutdown sequence
    ShutdownRequested,
    /// The workspace note now has this content
    NoteUpdated { content: String },
    /// A message was sent
    MessageSent(SentMessage),
    /// Show a launched application
    AppLaunched { app_name: String },
    /// Fresh diagnostics to display
    MetricsUpdated(SystemMetrics),
    /// Toggle or calibrate a peripheral
    PeripheralControl {
        peripheral: Peripheral,
        action: PeripheralAction,
    },
}
