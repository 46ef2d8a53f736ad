//! Observer registrations for the presentation layer
//!
//! Four typed callbacks replace any global event bus: state changes, log
//! entries, input volume, and tool activity. Registering again replaces the
//! previous callback.

use std::sync::{Arc, PoisonError, RwLock};

use crate::log::{LogEntry, LogSource};
use crate::session::SessionState;

type StateCallback = Arc<dyn Fn(SessionState) + Send + Sync>;
type LogCallback = Arc<dyn Fn(LogEntry) + Send + Sync>;
type VolumeCallback = Arc<dyn Fn(f32) + Send + Sync>;
type ToolActionCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback registry shared by the controller, dispatcher and text channel
#[derive(Default)]
pub struct Observers {
    state: RwLock<Option<StateCallback>>,
    log: RwLock<Option<LogCallback>>,
    volume: RwLock<Option<VolumeCallback>>,
    tool_action: RwLock<Option<ToolActionCallback>>,
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers").finish_non_exhaustive()
    }
}

/// Replace the callback in `slot`
fn register<T: ?Sized>(slot: &RwLock<Option<Arc<T>>>, callback: Arc<T>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
}

/// Clone the callback out of `slot` so it runs without the lock held
fn current<T: ?Sized>(slot: &RwLock<Option<Arc<T>>>) -> Option<Arc<T>> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

impl Observers {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the session-state observer
    pub fn on_state_change(&self, f: impl Fn(SessionState) + Send + Sync + 'static) {
        let callback: StateCallback = Arc::new(f);
        register(&self.state, callback);
    }

    /// Register the log observer
    pub fn on_log(&self, f: impl Fn(LogEntry) + Send + Sync + 'static) {
        let callback: LogCallback = Arc::new(f);
        register(&self.log, callback);
    }

    /// Register the input-volume observer (values in `[0, 1]`)
    pub fn on_volume(&self, f: impl Fn(f32) + Send + Sync + 'static) {
        let callback: VolumeCallback = Arc::new(f);
        register(&self.volume, callback);
    }

    /// Register the tool-activity observer
    pub fn on_tool_action(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        let callback: ToolActionCallback = Arc::new(f);
        register(&self.tool_action, callback);
    }

    pub(crate) fn state_changed(&self, state: SessionState) {
        tracing::debug!(%state, "session state changed");
        if let Some(cb) = current(&self.state) {
            cb(state);
        }
    }

    pub(crate) fn log(&self, entry: LogEntry) {
        match entry.source {
            LogSource::Error => tracing::warn!(id = %entry.id, "{}", entry.message),
            _ => tracing::info!(id = %entry.id, source = ?entry.source, "{}", entry.message),
        }
        if let Some(cb) = current(&self.log) {
            cb(entry);
        }
    }

    pub(crate) fn volume(&self, level: f32) {
        if let Some(cb) = current(&self.volume) {
            cb(level);
        }
    }

    pub(crate) fn tool_action(&self, name: &str) {
        if let Some(cb) = current(&self.tool_action) {
            cb(name);
        }
    }
}
