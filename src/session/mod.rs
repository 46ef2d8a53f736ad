//! Realtime session lifecycle
//!
//! [`SessionController`] owns the state machine, reconnect policy and audio
//! resources of one remote session at a time.

mod connectivity;
mod controller;
mod protocol;
mod reconnect;
mod state;
mod websocket;

pub use connectivity::{AssumeOnline, Connectivity, RouteProbe};
pub use controller::{SessionBuilder, SessionController};
pub use protocol::{
    AUDIO_MIME_TYPE, IMAGE_MIME_TYPE, InboundEvent, LiveLink, Liveness, Modality,
    OUTBOUND_CAPACITY, OpenRequest, OpenedSession, OutboundMessage, Transport,
};
pub use reconnect::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, ReconnectPolicy};
pub use state::SessionState;
pub use websocket::{DEFAULT_SETUP_TIMEOUT, WebSocketTransport};
