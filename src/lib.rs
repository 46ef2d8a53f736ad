//! Aryan Core - Realtime voice and tool-call session client
//!
//! This library provides the session core behind the Aryan assistant:
//! - A single live voice session with connect, backoff and teardown
//! - Microphone capture streamed out as 16 kHz PCM frames
//! - Gapless playback of inbound 24 kHz speech with barge-in
//! - Tool-call dispatch against host services
//! - A lazily started text chat channel sharing the same tools
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Presentation layer                   │
//! │   state  │  logs  │  volume  │  tool activity       │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Observers / HostEvent
//! ┌────────────────────▼────────────────────────────────┐
//! │                SessionController                     │
//! │  Backoff  │  Capture  │  Playback  │  ToolDispatcher │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Transport
//! ┌────────────────────▼────────────────────────────────┐
//! │            Realtime model service                    │
//! │   audio in  │  audio out  │  tool calls  │  text     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod log;
pub mod observer;
pub mod session;
pub mod text;
pub mod tools;
pub mod voice;

pub use config::{Config, SessionConfig};
pub use error::{ConnectionError, Error, Result};
pub use log::{LogEntry, LogKind, LogSource};
pub use observer::Observers;
pub use session::{
    Connectivity, ReconnectPolicy, SessionBuilder, SessionController, SessionState, Transport,
    WebSocketTransport,
};
pub use text::{ChatBackend, HttpChatBackend, TextChannel};
pub use tools::{HostEvent, HostServices, SystemHost, ToolCall, ToolDispatcher, ToolResult};
pub use voice::{AudioBackend, CpalBackend, OutputBus, PlaybackScheduler};
