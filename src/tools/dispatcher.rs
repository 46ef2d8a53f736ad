//! Executes tool calls and captures their outcome

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::json;
use tokio::sync::broadcast;

use super::catalog::{NoteMode, Tool};
use super::events::{CHANNEL_CAPACITY, HostEvent, SentMessage, SystemMetrics};
use super::host::HostServices;
use super::{ToolCall, ToolError, ToolResult};
use crate::log::{LogEntry, LogKind};
use crate::observer::Observers;
use crate::voice::OutputBus;

/// Prefix of the URL opened by `search_web`
pub const DEFAULT_SEARCH_URL: &str = "https://www.google.com/search?q=";

/// Upper bound on a location query
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(5);

const PROCESSES: [&str; 4] = ["Aryan.core", "Chrome.exe", "System_Idle", "Window_Server"];

/// Runs tool calls against the host and reports activity to observers
pub struct ToolDispatcher {
    host: Arc<dyn HostServices>,
    observers: Arc<Observers>,
    events: broadcast::Sender<HostEvent>,
    output: OutputBus,
    search_url: String,
    location_timeout: Duration,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("search_url", &self.search_url)
            .field("location_timeout", &self.location_timeout)
            .finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    /// Create a dispatcher writing gain changes to `output`
    #[must_use]
    pub fn new(host: Arc<dyn HostServices>, observers: Arc<Observers>, output: OutputBus) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            host,
            observers,
            events,
            output,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
        }
    }

    /// Use a different search URL prefix
    #[must_use]
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    /// Use a different location timeout
    #[must_use]
    pub const fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    /// Subscribe to host notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Execute one call
    ///
    /// Never fails: errors become an error-shaped result plus an error log
    /// entry. The tool-action observer fires either way.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        self.observers.log(
            LogEntry::ai(format!("System Action: {}", call.name))
                .with_kind(LogKind::Tool)
                .with_id(call.id.clone()),
        );

        let outcome = match Tool::parse(&call.name, &call.args) {
            Ok(tool) => self.execute(tool).await,
            Err(e) => Err(e),
        };

        let result = outcome.unwrap_or_else(|e| {
            tracing::warn!(tool = %call.name, error = %e, "tool failed");
            self.observers.log(
                LogEntry::error(format!("{} failed: {e}", call.name)).with_kind(LogKind::Error),
            );
            ToolResult::failure(e.to_string())
        });

        self.observers.tool_action(&call.name);
        result
    }

    fn notify(&self, event: HostEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn execute(&self, tool: Tool) -> Result<ToolResult, ToolError> {
        match tool {
            Tool::OpenWebsite { url } => {
                self.host.open_url(&url).await?;
                Ok(ToolResult::ok())
            }
            Tool::SearchWeb { query } => {
                let url = format!("{}{}", self.search_url, urlencoding::encode(&query));
                self.host.open_url(&url).await?;
                Ok(ToolResult::ok())
            }
            Tool::LaunchApp { app_name } => {
                let status = format!("Launched {app_name} in sandbox mode");
                self.notify(HostEvent::AppLaunched { app_name });
                Ok(ToolResult::status(status))
            }
            Tool::SystemDiagnostics => {
                let metrics = simulated_metrics();
                let value = serde_json::to_value(&metrics)
                    .map_err(|e| ToolError::Host(e.to_string()))?;
                self.notify(HostEvent::MetricsUpdated(metrics));
                Ok(ToolResult::Success(value))
            }
            Tool::ControlHardware { peripheral, action } => {
                self.notify(HostEvent::PeripheralControl { peripheral, action });
                Ok(ToolResult::status(format!(
                    "{} adjusted to {}",
                    peripheral.as_str(),
                    action.as_str()
                )))
            }
            Tool::SetScreenMode { mode } => {
                self.notify(HostEvent::ThemeChange { mode });
                Ok(ToolResult::ok())
            }
            Tool::BatteryStatus => {
                let battery = self.host.battery().await?;
                Ok(ToolResult::Success(json!({
                    "level": battery.level,
                    "charging": battery.charging,
                })))
            }
            Tool::DeviceLocation => {
                let position = tokio::time::timeout(self.location_timeout, self.host.location())
                    .await
                    .map_err(|_| ToolError::Timeout("location request".to_string()))??;
                Ok(ToolResult::Success(json!({
                    "lat": position.lat,
                    "lon": position.lon,
                })))
            }
            Tool::SetVolume { level } => {
                if !level.is_finite() {
                    return Err(ToolError::InvalidArguments(format!(
                        "volume level {level} is not a number"
                    )));
                }
                #[allow(clippy::cast_possible_truncation)]
                let gain = (level / 100.0).clamp(0.0, 1.0) as f32;
                self.output.set_gain(gain);
                Ok(ToolResult::ok())
            }
            Tool::SetBrightness { level } => {
                self.notify(HostEvent::BrightnessChange { level });
                Ok(ToolResult::ok())
            }
            Tool::WriteNotebook { content, mode } => {
                let current = self.host.workspace_note().await?;
                let content = match mode {
                    NoteMode::Append => format!("{current}\n{content}"),
                    NoteMode::Replace => content,
                };
                self.notify(HostEvent::NoteUpdated { content });
                Ok(ToolResult::status("Notebook updated"))
            }
            Tool::SendMessage { recipient, content } => {
                self.notify(HostEvent::MessageSent(SentMessage {
                    recipient,
                    content,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                }));
                Ok(ToolResult::status("Message sent via Aryan Messenger"))
            }
            Tool::Shutdown => {
                self.notify(HostEvent::ShutdownRequested);
                Ok(ToolResult::ok())
            }
            Tool::Unknown(name) => {
                tracing::debug!(tool = %name, "unknown tool, returning default result");
                Ok(ToolResult::ok())
            }
        }
    }
}

fn simulated_metrics() -> SystemMetrics {
    let mut rng = rand::thread_rng();
    SystemMetrics {
        cpu: format!("{}%", rng.gen_range(10..50)),
        ram: format!("{}MB / 16GB", rng.gen_range(4000..6000)),
        temp: format!("{}°C", rng.gen_range(35..45)),
        processes: PROCESSES.iter().map(ToString::to_string).collect(),
    }
}
