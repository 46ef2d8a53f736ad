//! WebSocket [`Transport`] carrying a JSON envelope
//!
//! Frames are JSON objects tagged by `type`. The client opens with `setup`
//! and waits for `setup_complete`; afterwards it streams `realtime_input`
//! chunks (base64 payloads) and `tool_response` frames, while the server
//! streams `audio`, `interrupted`, `tool_call` and `error` frames.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::protocol::{
    InboundEvent, OUTBOUND_CAPACITY, OpenRequest, OpenedSession, OutboundMessage, Transport,
};
use crate::error::ConnectionError;
use crate::tools::ToolCall;

/// How long to wait for the server to acknowledge `setup`
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Setup {
        #[serde(flatten)]
        request: OpenRequest,
    },
    RealtimeInput {
        mime_type: String,
        data: String,
    },
    ToolResponse {
        id: String,
        name: String,
        response: Value,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    SetupComplete,
    Audio { data: String },
    Interrupted,
    ToolCall { calls: Vec<ToolCall> },
    Error { message: String },
    #[serde(other)]
    Unknown,
}

/// Realtime transport over a WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    setup_timeout: Duration,
}

impl WebSocketTransport {
    /// Create a transport for the endpoint at `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
        }
    }

    /// Override the setup acknowledgement timeout
    #[must_use]
    pub const fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }
}

/// Append the API key to the endpoint URL as a `key` query parameter
fn endpoint_url(base: &str, api_key: &SecretString) -> Result<url::Url, ConnectionError> {
    let mut url = url::Url::parse(base)
        .map_err(|e| ConnectionError::Transport(format!("invalid endpoint url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("key", api_key.expose_secret());
    Ok(url)
}

fn encode_outbound(message: OutboundMessage) -> serde_json::Result<String> {
    let frame = match message {
        OutboundMessage::Media { mime_type, data } => ClientFrame::RealtimeInput {
            mime_type: mime_type.to_string(),
            data: B64.encode(data),
        },
        OutboundMessage::ToolResponse { id, name, response } => {
            ClientFrame::ToolResponse { id, name, response }
        }
    };
    serde_json::to_string(&frame)
}

/// Map one server text frame to an inbound event
///
/// Returns `None` for frames the session loop does not act on.
fn decode_inbound(text: &str) -> Option<InboundEvent> {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed server frame");
            return None;
        }
    };

    match frame {
        ServerFrame::Audio { data } => match B64.decode(data) {
            Ok(bytes) => Some(InboundEvent::Audio(bytes)),
            Err(e) => {
                tracing::warn!(error = %e, "dropping audio frame with bad base64");
                None
            }
        },
        ServerFrame::Interrupted => Some(InboundEvent::Interrupted),
        ServerFrame::ToolCall { calls } => Some(InboundEvent::ToolCalls(calls)),
        ServerFrame::Error { message } => Some(InboundEvent::Error(message)),
        ServerFrame::SetupComplete | ServerFrame::Unknown => None,
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        request: OpenRequest,
        api_key: &SecretString,
    ) -> Result<OpenedSession, ConnectionError> {
        let url = endpoint_url(&self.url, api_key)?;
        let transport_err = |e: tokio_tungstenite::tungstenite::Error| {
            ConnectionError::Transport(e.to_string())
        };

        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(transport_err)?;

        let setup = serde_json::to_string(&ClientFrame::Setup { request })
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        ws.send(Message::Text(setup)).await.map_err(transport_err)?;

        let acknowledged = tokio::time::timeout(self.setup_timeout, async {
            while let Some(message) = ws.next().await {
                match message.map_err(transport_err)? {
                    Message::Text(text) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(ServerFrame::SetupComplete) => return Ok(()),
                        Ok(ServerFrame::Error { message }) => {
                            return Err(ConnectionError::Transport(message));
                        }
                        _ => {}
                    },
                    Message::Close(frame) => {
                        let reason = frame.map_or_else(
                            || "session closed during setup".to_string(),
                            |f| f.reason.to_string(),
                        );
                        return Err(ConnectionError::Transport(reason));
                    }
                    _ => {}
                }
            }
            Err(ConnectionError::Transport(
                "session closed during setup".to_string(),
            ))
        })
        .await;

        match acknowledged {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectionError::Transport(
                    "timed out waiting for session setup".to_string(),
                ));
            }
        }

        tracing::debug!(endpoint = %self.url, "realtime session open");

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::unbounded_channel::<InboundEvent>();

        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let text = match encode_outbound(message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode outbound frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::debug!(error = %e, "outbound stream ended");
                    return;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            tracing::debug!("realtime session writer closed");
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => decode_inbound(&text),
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = in_tx.send(InboundEvent::Closed { reason });
                        return;
                    }
                    Ok(_) => None,
                    Err(e) => {
                        let _ = in_tx.send(InboundEvent::Error(e.to_string()));
                        return;
                    }
                };
                if let Some(event) = event
                    && in_tx.send(event).is_err()
                {
                    return;
                }
            }
            let _ = in_tx.send(InboundEvent::Closed { reason: None });
        });

        Ok(OpenedSession {
            outbound: out_tx,
            inbound: in_rx,
            tasks: vec![writer.abort_handle(), reader.abort_handle()],
        })
    }
}
