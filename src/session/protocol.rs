//! Shape of the remote realtime protocol
//!
//! A [`Transport`] opens a session from an [`OpenRequest`] and hands back a
//! pair of channels: a bounded outbound sender the client pushes media and
//! tool responses into, and an inbound receiver of [`InboundEvent`]s. The
//! outbound side never waits: when the transport falls behind, new messages
//! are dropped. Dropping the outbound sender closes the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;

use crate::error::ConnectionError;
use crate::tools::{ToolCall, ToolDeclaration};

/// MIME type of outbound microphone chunks
pub const AUDIO_MIME_TYPE: &str = "audio/pcm;rate=16000";
/// MIME type of outbound camera frames
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Outbound messages a transport buffers before new ones are dropped
pub const OUTBOUND_CAPACITY: usize = 32;

/// Requested response modality
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Spoken responses
    #[default]
    Audio,
    /// Text responses
    Text,
}

/// Everything the remote side needs to start a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenRequest {
    /// Model identifier
    pub model: String,
    /// Voice identifier for synthesized speech
    pub voice: String,
    /// Rendered system instruction
    pub instruction: String,
    /// Declared tool schema
    pub tools: Vec<ToolDeclaration>,
    /// Requested output modality
    pub modality: Modality,
}

/// One message from the remote side
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A chunk of PCM16 speech at the playback rate
    Audio(Vec<u8>),
    /// The user barged in; stop playback
    Interrupted,
    /// A batch of tool-call requests
    ToolCalls(Vec<ToolCall>),
    /// The remote side closed the session
    Closed {
        /// Close reason, if one was given
        reason: Option<String>,
    },
    /// The transport failed mid-session
    Error(String),
}

/// One message from the client
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Realtime media chunk (microphone audio or a camera frame)
    Media {
        /// MIME type of `data`
        mime_type: &'static str,
        /// Raw bytes
        data: Vec<u8>,
    },
    /// Response to a tool call, keyed by call id
    ToolResponse {
        /// Call identifier
        id: String,
        /// Tool name
        name: String,
        /// Serialized tool result
        response: Value,
    },
}

impl OutboundMessage {
    /// Short label for logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Media { mime_type, .. } => *mime_type,
            Self::ToolResponse { .. } => "tool_response",
        }
    }
}

/// Shared flag marking one session as still current
///
/// Every deferred callback checks this before acting; once killed a session
/// never becomes live again.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    /// Create a live token
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Whether the session is still current
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the session stale
    pub fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Client-side handle to an open session
///
/// Every send checks liveness first; sends on a stale session are dropped.
#[derive(Debug, Clone)]
pub struct LiveLink {
    outbound: mpsc::Sender<OutboundMessage>,
    liveness: Liveness,
}

impl LiveLink {
    /// Wrap an outbound sender with a fresh liveness token
    #[must_use]
    pub fn new(outbound: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            outbound,
            liveness: Liveness::new(),
        }
    }

    /// The token shared with this session's callbacks
    #[must_use]
    pub const fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Whether sends will still be attempted
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.liveness.is_live() && !self.outbound.is_closed()
    }

    fn send(&self, message: OutboundMessage) -> bool {
        if !self.is_live() {
            return false;
        }
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                tracing::debug!(kind = message.kind(), "outbound queue full, dropping");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Push a 16 kHz PCM16 microphone chunk
    pub fn send_audio(&self, pcm: Vec<u8>) -> bool {
        self.send(OutboundMessage::Media {
            mime_type: AUDIO_MIME_TYPE,
            data: pcm,
        })
    }

    /// Push an encoded camera frame
    pub fn send_image(&self, jpeg: Vec<u8>) -> bool {
        self.send(OutboundMessage::Media {
            mime_type: IMAGE_MIME_TYPE,
            data: jpeg,
        })
    }

    /// Answer a tool call
    pub fn send_tool_response(&self, id: String, name: String, response: Value) -> bool {
        self.send(OutboundMessage::ToolResponse { id, name, response })
    }

    /// Mark the session stale; later sends become no-ops
    pub fn close(&self) {
        self.liveness.kill();
    }
}

/// Channels of a freshly opened session
#[derive(Debug)]
pub struct OpenedSession {
    /// Client to remote, bounded by [`OUTBOUND_CAPACITY`]
    pub outbound: mpsc::Sender<OutboundMessage>,
    /// Remote to client
    pub inbound: mpsc::UnboundedReceiver<InboundEvent>,
    /// Background work serving this session; aborted when the session ends
    pub tasks: Vec<AbortHandle>,
}

/// Opens remote realtime sessions
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session and wait until the remote side acknowledges it
    ///
    /// # Errors
    ///
    /// Returns a connection error if the session cannot be established
    async fn open(
        &self,
        request: OpenRequest,
        api_key: &SecretString,
    ) -> Result<OpenedSession, ConnectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sends_reach_the_channel_while_live() {
        let (tx, mut rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let link = LiveLink::new(tx);

        assert!(link.send_audio(vec![1, 2]));
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundMessage::Media {
                mime_type: AUDIO_MIME_TYPE,
                data: vec![1, 2],
            }
        );
    }

    #[test]
    fn closed_link_drops_sends() {
        let (tx, mut rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let link = LiveLink::new(tx);
        let clone = link.clone();

        link.close();
        assert!(!clone.is_live());
        assert!(!clone.send_image(vec![0xff]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_marks_link_dead() {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let link = LiveLink::new(tx);
        drop(rx);

        assert!(!link.is_live());
        assert!(!link.send_tool_response("1".into(), "x".into(), Value::Null));
    }

    #[test]
    fn full_queue_drops_instead_of_waiting() {
        let (tx, mut rx) = mpsc::channel(2);
        let link = LiveLink::new(tx);

        assert!(link.send_audio(vec![1]));
        assert!(link.send_audio(vec![2]));
        assert!(!link.send_audio(vec![3]));
        assert!(link.is_live());

        // Room again once the transport catches up
        assert!(rx.try_recv().is_ok());
        assert!(link.send_audio(vec![4]));

        let mut delivered = Vec::new();
        while let Ok(OutboundMessage::Media { data, .. }) = rx.try_recv() {
            delivered.extend(data);
        }
        assert_eq!(delivered, vec![2, 4]);
    }
}
