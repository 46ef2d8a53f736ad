//! Text channel
//!
//! A request/response exchange that runs beside the realtime session. It
//! shares the session's persona and tool schema but has no lifecycle of its
//! own: the conversation is created on first use, and failures are logged
//! and dropped without touching the session state.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{SessionConfig, usable_key};
use crate::log::LogEntry;
use crate::observer::Observers;
use crate::tools::{ToolCall, ToolDeclaration, ToolDispatcher};
use crate::{Error, Result};

/// Speaker of one conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of the text conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

/// Request body for one exchange; carries the whole history
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub instruction: String,
    pub tools: Vec<ToolDeclaration>,
    pub history: Vec<ChatTurn>,
}

/// Reply to one exchange
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatReply {
    /// Assistant text, if any
    #[serde(default)]
    pub text: Option<String>,
    /// Tool calls requested alongside the text
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// Performs one text exchange
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Submit the conversation and return the assistant's reply
    ///
    /// # Errors
    ///
    /// Returns error if the exchange fails
    async fn send(&self, request: ChatRequest, api_key: &SecretString) -> Result<ChatReply>;
}

/// [`ChatBackend`] posting JSON over HTTP with bearer auth
#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpChatBackend {
    /// Create a backend posting to `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send(&self, request: ChatRequest, api_key: &SecretString) -> Result<ChatReply> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Text(format!("{status}: {body}")));
        }

        Ok(response.json().await?)
    }
}

struct Conversation {
    instruction: String,
    history: Vec<ChatTurn>,
}

/// Text exchange sharing the session's persona and tools
pub struct TextChannel {
    backend: Arc<dyn ChatBackend>,
    dispatcher: Arc<ToolDispatcher>,
    observers: Arc<Observers>,
    session: SessionConfig,
    api_key: Option<SecretString>,
    conversation: Mutex<Option<Conversation>>,
}

impl std::fmt::Debug for TextChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChannel")
            .field("model", &self.session.text_model)
            .finish_non_exhaustive()
    }
}

impl TextChannel {
    /// Create a channel; no conversation exists until the first send
    #[must_use]
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        dispatcher: Arc<ToolDispatcher>,
        observers: Arc<Observers>,
        session: SessionConfig,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            observers,
            session,
            api_key,
            conversation: Mutex::new(None),
        }
    }

    /// Whether the conversation has been created
    pub async fn is_started(&self) -> bool {
        self.conversation.lock().await.is_some()
    }

    /// Number of turns kept so far
    pub async fn history_len(&self) -> usize {
        self.conversation
            .lock()
            .await
            .as_ref()
            .map_or(0, |c| c.history.len())
    }

    /// Send a user message
    ///
    /// Logs the message, logs any assistant text, and dispatches any tool
    /// calls. Errors are logged and swallowed.
    pub async fn send(&self, text: &str) {
        self.observers.log(LogEntry::user(text));

        let Some(api_key) = self.api_key.as_ref().filter(|key| usable_key(key)) else {
            tracing::debug!("no credential, text message not sent");
            return;
        };

        let mut guard = self.conversation.lock().await;
        let conversation = guard.get_or_insert_with(|| Conversation {
            instruction: self.session.system_instruction(),
            history: Vec::new(),
        });

        conversation.history.push(ChatTurn {
            role: ChatRole::User,
            text: text.to_string(),
        });
        let request = ChatRequest {
            model: self.session.text_model.clone(),
            instruction: conversation.instruction.clone(),
            tools: self.session.tools.clone(),
            history: conversation.history.clone(),
        };

        let reply = match self.backend.send(request, api_key).await {
            Ok(reply) => reply,
            Err(e) => {
                conversation.history.pop();
                tracing::warn!(error = %e, "text exchange failed");
                return;
            }
        };

        if let Some(text) = reply.text.filter(|t| !t.is_empty()) {
            conversation.history.push(ChatTurn {
                role: ChatRole::Assistant,
                text: text.clone(),
            });
            self.observers.log(LogEntry::ai(text));
        }
        drop(guard);

        // Text replies are not continued, so results stay local
        for call in &reply.tool_calls {
            let result = self.dispatcher.dispatch(call).await;
            tracing::debug!(tool = %call.name, ok = result.is_ok(), "text tool call handled");
        }
    }
}
