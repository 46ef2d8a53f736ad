//! Declared tool set and argument parsing

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ToolError;

/// One entry of the tool schema advertised to the remote side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Tool name
    pub name: String,
    /// What the tool does, for the model
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

impl ToolDeclaration {
    fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Hardware peripheral addressed by `control_hardware`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Peripheral {
    Camera,
    Microphone,
    Speakers,
    Display,
}

/// Action applied to a peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeripheralAction {
    On,
    Off,
    Calibrate,
}

/// Presentation theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

/// How `write_notebook` combines new content with the existing note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteMode {
    Append,
    Replace,
}

impl Peripheral {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Microphone => "microphone",
            Self::Speakers => "speakers",
            Self::Display => "display",
        }
    }
}

impl PeripheralAction {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Calibrate => "calibrate",
        }
    }
}

/// A parsed tool call
#[derive(Debug, Clone, PartialEq)]
pub enum Tool {
    OpenWebsite { url: String },
    SearchWeb { query: String },
    LaunchApp { app_name: String },
    SystemDiagnostics,
    ControlHardware {
        peripheral: Peripheral,
        action: PeripheralAction,
    },
    SetScreenMode { mode: Theme },
    BatteryStatus,
    DeviceLocation,
    SetVolume { level: f64 },
    SetBrightness { level: f64 },
    WriteNotebook { content: String, mode: NoteMode },
    SendMessage { recipient: String, content: String },
    Shutdown,
    /// A name outside the declared set
    Unknown(String),
}

fn arg<T: DeserializeOwned>(args: &Value, key: &str) -> Result<T, ToolError> {
    let value = args
        .get(key)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing `{key}`")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| ToolError::InvalidArguments(format!("`{key}`: {e}")))
}

impl Tool {
    /// Parse a call by name
    ///
    /// Unknown names parse to [`Tool::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidArguments` if a declared tool is missing an argument
    /// or an argument has the wrong type.
    pub fn parse(name: &str, args: &Value) -> Result<Self, ToolError> {
        let tool = match name {
            "open_website" => Self::OpenWebsite {
                url: arg(args, "url")?,
            },
            "search_web" => Self::SearchWeb {
                query: arg(args, "query")?,
            },
            "launch_app" => Self::LaunchApp {
                app_name: arg(args, "appName")?,
            },
            "get_system_diagnostics" => Self::SystemDiagnostics,
            "control_hardware" => Self::ControlHardware {
                peripheral: arg(args, "peripheral")?,
                action: arg(args, "action")?,
            },
            "set_screen_mode" => Self::SetScreenMode {
                mode: arg(args, "mode")?,
            },
            "get_battery_status" => Self::BatteryStatus,
            "get_device_location" => Self::DeviceLocation,
            "set_volume" => Self::SetVolume {
                level: arg(args, "level")?,
            },
            "set_brightness" => Self::SetBrightness {
                level: arg(args, "level")?,
            },
            "write_notebook" => Self::WriteNotebook {
                content: arg(args, "content")?,
                mode: arg(args, "mode")?,
            },
            "send_message" => Self::SendMessage {
                recipient: arg(args, "recipient")?,
                content: arg(args, "content")?,
            },
            "shutdown_system" => Self::Shutdown,
            other => Self::Unknown(other.to_string()),
        };
        Ok(tool)
    }
}

/// The tool schema advertised to the remote side
#[must_use]
pub fn declarations() -> Vec<ToolDeclaration> {
    let empty = json!({ "type": "object", "properties": {} });
    let level = |what: &str| {
        json!({
            "type": "object",
            "properties": {
                "level": { "type": "number", "description": format!("{what} level from 0 to 100.") }
            },
            "required": ["level"]
        })
    };

    vec![
        ToolDeclaration::new(
            "open_website",
            "Opens a specific website URL in a new tab.",
            json!({
                "type": "object",
                "properties": { "url": { "type": "string", "description": "The URL to open" } },
                "required": ["url"]
            }),
        ),
        ToolDeclaration::new(
            "search_web",
            "Searches the web for a specific query.",
            json!({
                "type": "object",
                "properties": { "query": { "type": "string", "description": "The search query" } },
                "required": ["query"]
            }),
        ),
        ToolDeclaration::new(
            "launch_app",
            "Launches a system application (simulated).",
            json!({
                "type": "object",
                "properties": {
                    "appName": {
                        "type": "string",
                        "description": "Name of the app: Terminal, Browser, Mail, Music, Settings, Camera, Notebook, Maps"
                    }
                },
                "required": ["appName"]
            }),
        ),
        ToolDeclaration::new(
            "get_system_diagnostics",
            "Performs a full system health check and returns simulated CPU, RAM, and temperature metrics.",
            empty.clone(),
        ),
        ToolDeclaration::new(
            "control_hardware",
            "Toggles or adjusts hardware peripherals.",
            json!({
                "type": "object",
                "properties": {
                    "peripheral": {
                        "type": "string",
                        "enum": ["camera", "microphone", "speakers", "display"],
                        "description": "The peripheral to control"
                    },
                    "action": {
                        "type": "string",
                        "enum": ["on", "off", "calibrate"],
                        "description": "Action to perform"
                    }
                },
                "required": ["peripheral", "action"]
            }),
        ),
        ToolDeclaration::new(
            "set_screen_mode",
            "Sets the application theme (light or dark).",
            json!({
                "type": "object",
                "properties": { "mode": { "type": "string", "enum": ["light", "dark"] } },
                "required": ["mode"]
            }),
        ),
        ToolDeclaration::new(
            "get_battery_status",
            "Check the device battery level and charging status.",
            empty.clone(),
        ),
        ToolDeclaration::new(
            "get_device_location",
            "Get the current geographical coordinates of the device.",
            empty.clone(),
        ),
        ToolDeclaration::new(
            "set_volume",
            "Sets the volume of the assistant speech (0-100).",
            level("Volume"),
        ),
        ToolDeclaration::new(
            "set_brightness",
            "Sets the screen brightness level (0-100).",
            level("Brightness"),
        ),
        ToolDeclaration::new(
            "write_notebook",
            "Writes or appends content to the user's digital notebook/workspace.",
            json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "The text to write in the notebook." },
                    "mode": {
                        "type": "string",
                        "enum": ["append", "replace"],
                        "description": "Whether to append to existing text or replace it."
                    }
                },
                "required": ["content", "mode"]
            }),
        ),
        ToolDeclaration::new(
            "send_message",
            "Sends a message to a specific contact or recipient.",
            json!({
                "type": "object",
                "properties": {
                    "recipient": { "type": "string", "description": "The name or number of the recipient." },
                    "content": { "type": "string", "description": "The message body." }
                },
                "required": ["recipient", "content"]
            }),
        ),
        ToolDeclaration::new(
            "shutdown_system",
            "Initiates a system shutdown sequence.",
            empty,
        ),
    ]
}
