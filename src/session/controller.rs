//! Session controller
//!
//! Owns the connection state machine:
//!
//! ```text
//! Disconnected --connect()--> Connecting --open--> Connected
//!                              |    ^                 |
//!                      failure |    | backoff         | remote close
//!                              v    |                 v
//!                        (retry scheduled)       Disconnected
//!                              |
//!                   budget spent v
//!                            Error
//! ```
//!
//! A network drop on an open session reports `Disconnected` and then
//! retries through the same backoff as a failed attempt.
//!
//! Every attempt is stamped with an epoch. `connect()` and `disconnect()`
//! bump the epoch, so work belonging to an older attempt (a pending retry,
//! a late transport open, queued inbound events) finds a stale epoch and
//! does nothing. Each open session also carries a [`Liveness`] token that
//! the capture callback, the inbound loop and tool responses check before
//! acting.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use secrecy::SecretString;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{AbortHandle, JoinHandle};

use super::connectivity::{Connectivity, RouteProbe};
use super::protocol::{InboundEvent, LiveLink, Liveness, Transport};
use super::reconnect::ReconnectPolicy;
use super::state::SessionState;
use super::websocket::WebSocketTransport;
use crate::config::{Config, DEFAULT_LIVE_URL, DEFAULT_TEXT_URL, SessionConfig, usable_key};
use crate::error::{ConnectionError, Error};
use crate::log::{LogEntry, LogKind};
use crate::observer::Observers;
use crate::text::{ChatBackend, HttpChatBackend, TextChannel};
use crate::tools::{
    DEFAULT_LOCATION_TIMEOUT, DEFAULT_SEARCH_URL, HostEvent, HostServices, SystemHost, ToolCall,
    ToolDispatcher,
};
use crate::voice::{
    AudioBackend, AudioStream, CaptureEncoder, CpalBackend, OutputBus, PlaybackScheduler,
};

/// Why an attempt stopped short of `Connected`
enum AttemptError {
    /// A newer `connect()` or a `disconnect()` took over
    Superseded,
    /// Feeds the reconnect policy
    Failed(ConnectionError),
}

impl From<ConnectionError> for AttemptError {
    fn from(error: ConnectionError) -> Self {
        Self::Failed(error)
    }
}

fn audio_error(error: Error) -> ConnectionError {
    match error {
        Error::Audio(message) => ConnectionError::Audio(message),
        other => ConnectionError::Audio(other.to_string()),
    }
}

/// Device streams taken out of the core so they drop outside its lock
#[derive(Default)]
struct Released {
    input: Option<Box<dyn AudioStream>>,
    output: Option<Box<dyn AudioStream>>,
}

struct Core {
    state: SessionState,
    policy: ReconnectPolicy,
    epoch: u64,
    link: Option<LiveLink>,
    input: Option<Box<dyn AudioStream>>,
    output: Option<Box<dyn AudioStream>>,
    retry: Option<JoinHandle<()>>,
    tasks: Vec<AbortHandle>,
}

impl Core {
    /// Cancel pending work and hand back every device stream
    fn teardown(&mut self) -> Released {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
        self.end_session();
        Released {
            input: self.input.take(),
            output: self.output.take(),
        }
    }

    /// Kill the live link and cancel the transport, inbound loop and tool
    /// batches
    fn end_session(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn track(&mut self, task: AbortHandle) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }
}

struct Inner {
    session: SessionConfig,
    api_key: Option<SecretString>,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    audio: Arc<dyn AudioBackend>,
    observers: Arc<Observers>,
    dispatcher: Arc<ToolDispatcher>,
    text: TextChannel,
    output: OutputBus,
    scheduler: Mutex<PlaybackScheduler>,
    capture: Arc<CaptureEncoder>,
    core: Mutex<Core>,
}

/// Handle to the realtime session; clones share one session
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("language", &self.inner.session.language)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Start building a controller for `session`
    #[must_use]
    pub fn builder(session: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(session)
    }

    /// Build a controller with the real transport, audio and host
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let host = SystemHost::new(
            config.host.geolocation_url.clone(),
            config.host.notes_path.clone(),
        );
        Self::builder(config.session.clone())
            .api_key(config.endpoint.api_key.clone())
            .reconnect(config.reconnect.policy())
            .transport(Arc::new(WebSocketTransport::new(&config.endpoint.live_url)))
            .chat_backend(Arc::new(HttpChatBackend::new(&config.endpoint.text_url)))
            .audio(Arc::new(CpalBackend::new(
                config.audio.input_device.clone(),
                config.audio.output_device.clone(),
            )))
            .host(Arc::new(host))
            .search_url(&config.host.search_url)
            .location_timeout(config.host.location_timeout)
            .build()
    }

    fn core(&self) -> MutexGuard<'_, Core> {
        self.inner
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.core().state
    }

    /// Failures recorded since the last manual connect or successful open
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.core().policy.attempts()
    }

    /// Whether a session is open and accepting input
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.core().link.as_ref().is_some_and(LiveLink::is_live)
    }

    /// The session configuration this controller was built with
    #[must_use]
    pub fn session_config(&self) -> &SessionConfig {
        &self.inner.session
    }

    /// Shared output clock and gain
    #[must_use]
    pub fn output(&self) -> &OutputBus {
        &self.inner.output
    }

    /// Subscribe to host notifications raised by tools
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.inner.dispatcher.subscribe()
    }

    /// Register the session-state observer
    pub fn on_state_change(&self, f: impl Fn(SessionState) + Send + Sync + 'static) {
        self.inner.observers.on_state_change(f);
    }

    /// Register the log observer
    pub fn on_log(&self, f: impl Fn(LogEntry) + Send + Sync + 'static) {
        self.inner.observers.on_log(f);
    }

    /// Register the input-volume observer
    pub fn on_volume(&self, f: impl Fn(f32) + Send + Sync + 'static) {
        self.inner.observers.on_volume(f);
    }

    /// Register the tool-activity observer
    pub fn on_tool_action(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.observers.on_tool_action(f);
    }

    /// Start a session, superseding any previous one
    ///
    /// Returns once the first attempt has finished; failures are retried in
    /// the background according to the reconnect policy.
    pub async fn connect(&self) {
        let (epoch, released) = {
            let mut core = self.core();
            if !core.state.can_start() {
                tracing::debug!(state = %core.state, "connect supersedes the active session");
            }
            let released = core.teardown();
            core.policy.reset();
            core.epoch += 1;
            (core.epoch, released)
        };
        self.inner.capture.detach();
        self.interrupt_playback();
        drop(released);

        self.attempt(epoch).await;
    }

    /// Tear everything down and force `Disconnected`
    ///
    /// Safe to call from any state and any number of times. Device streams
    /// are released and pending retries cancelled before this returns.
    pub fn disconnect(&self) {
        let released = {
            let mut core = self.core();
            core.epoch += 1;
            core.state = SessionState::Disconnected;
            core.teardown()
        };
        self.inner.capture.detach();
        self.interrupt_playback();
        drop(released);

        tracing::info!("session disconnected");
        self.inner
            .observers
            .state_changed(SessionState::Disconnected);
    }

    /// Send a text message over the text channel
    pub async fn send_text(&self, text: &str) {
        self.inner.text.send(text).await;
    }

    /// Send an encoded camera frame; dropped unless a session is live
    pub fn send_image(&self, jpeg: Vec<u8>) -> bool {
        let link = self.core().link.clone();
        link.is_some_and(|link| link.send_image(jpeg))
    }

    fn interrupt_playback(&self) -> usize {
        self.inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .interrupt()
    }

    /// Set `state` if `epoch` is still current; returns whether it was set
    fn transition(&self, epoch: u64, state: SessionState) -> bool {
        {
            let mut core = self.core();
            if core.epoch != epoch {
                return false;
            }
            core.state = state;
        }
        self.inner.observers.state_changed(state);
        true
    }

    fn attempt(&self, epoch: u64) -> BoxFuture<'static, ()> {
        let this = self.clone();
        Box::pin(async move {
            if !this.transition(epoch, SessionState::Connecting) {
                return;
            }
            match this.open(epoch).await {
                Ok(()) => {}
                Err(AttemptError::Superseded) => {
                    tracing::debug!(epoch, "connection attempt superseded");
                }
                Err(AttemptError::Failed(error)) => this.fail(epoch, &error),
            }
        })
    }

    /// Acquire devices and open the remote session
    async fn open(&self, epoch: u64) -> Result<(), AttemptError> {
        if !self.inner.connectivity.is_online() {
            return Err(ConnectionError::Offline.into());
        }

        let api_key = self
            .inner
            .api_key
            .clone()
            .filter(usable_key)
            .ok_or(ConnectionError::MissingCredential)?;

        self.acquire_audio(epoch)?;

        let opened = self
            .inner
            .transport
            .open(self.inner.session.open_request(), &api_key)
            .await?;

        let link = LiveLink::new(opened.outbound);
        {
            let mut core = self.core();
            if core.epoch != epoch {
                link.close();
                for task in &opened.tasks {
                    task.abort();
                }
                return Err(AttemptError::Superseded);
            }
            for task in opened.tasks {
                core.track(task);
            }
            core.link = Some(link.clone());
            core.state = SessionState::Connected;
            core.policy.reset();
        }

        tracing::info!(model = %self.inner.session.model, "session open");
        self.inner.observers.state_changed(SessionState::Connected);
        self.inner.capture.attach(link.clone());
        self.inner.observers.log(LogEntry::system(format!(
            "Core synchronization online. Language: {}",
            self.inner.session.language
        )));

        let mut core = self.core();
        if core.epoch != epoch {
            return Err(AttemptError::Superseded);
        }
        let events = tokio::spawn(self.clone().run_events(epoch, link, opened.inbound));
        core.track(events.abort_handle());
        Ok(())
    }

    /// Reuse the speaker stream if one is open; always open a fresh microphone
    fn acquire_audio(&self, epoch: u64) -> Result<(), AttemptError> {
        let need_output = self.core().output.is_none();
        let output = if need_output {
            Some(
                self.inner
                    .audio
                    .open_output(self.inner.output.clone())
                    .map_err(audio_error)?,
            )
        } else {
            None
        };
        let input = self
            .inner
            .audio
            .open_input(self.inner.capture.callback())
            .map_err(audio_error)?;

        let stale = {
            let mut core = self.core();
            if core.epoch == epoch {
                if output.is_some() {
                    core.output = output;
                }
                core.input = Some(input);
                None
            } else {
                Some((input, output))
            }
        };
        match stale {
            None => Ok(()),
            Some(streams) => {
                drop(streams);
                Err(AttemptError::Superseded)
            }
        }
    }

    /// Release the microphone, log the error and retry or give up
    fn fail(&self, epoch: u64, error: &ConnectionError) {
        let (input, next, attempts, dropped) = {
            let mut core = self.core();
            if core.epoch != epoch {
                return;
            }
            core.end_session();
            let input = core.input.take();
            let next = core.policy.record_failure();
            // A drop of an open session passes through Disconnected first
            let dropped = core.state == SessionState::Connected && next.is_some();
            if next.is_none() {
                core.state = SessionState::Error;
            } else if dropped {
                core.state = SessionState::Disconnected;
            }
            (input, next, core.policy.attempts(), dropped)
        };
        self.inner.capture.detach();
        self.interrupt_playback();
        drop(input);

        if dropped {
            self.inner
                .observers
                .state_changed(SessionState::Disconnected);
        }

        tracing::warn!(error = %error, attempts, "connection failed");
        self.inner
            .observers
            .log(LogEntry::error(error.to_string()).with_kind(LogKind::Error));

        let Some(delay) = next else {
            tracing::error!(attempts, "reconnect attempts exhausted");
            self.inner.observers.state_changed(SessionState::Error);
            return;
        };

        tracing::info!(
            attempt = attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        self.schedule_retry(epoch, delay);
    }

    fn schedule_retry(&self, epoch: u64, delay: Duration) {
        let this = self.clone();
        let retry = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.attempt(epoch).await;
        });

        let mut core = self.core();
        if core.epoch == epoch {
            core.retry = Some(retry);
        } else {
            retry.abort();
        }
    }

    /// The remote side ended an open session
    fn remote_closed(&self, epoch: u64, link: &LiveLink, reason: Option<&str>) {
        let input = {
            let mut core = self.core();
            if core.epoch != epoch || !link.liveness().is_live() {
                return;
            }
            core.end_session();
            core.state = SessionState::Disconnected;
            core.input.take()
        };
        self.inner.capture.detach();
        self.interrupt_playback();
        drop(input);

        tracing::info!(reason = reason.unwrap_or("none"), "session closed by remote");
        self.inner
            .observers
            .state_changed(SessionState::Disconnected);
    }

    async fn run_events(
        self,
        epoch: u64,
        link: LiveLink,
        mut inbound: mpsc::UnboundedReceiver<InboundEvent>,
    ) {
        let liveness: Liveness = link.liveness().clone();

        while let Some(event) = inbound.recv().await {
            if !liveness.is_live() {
                return;
            }
            match event {
                InboundEvent::Audio(chunk) => {
                    let mut scheduler = self
                        .inner
                        .scheduler
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    if let Err(e) = scheduler.enqueue(&chunk) {
                        tracing::warn!(error = %e, bytes = chunk.len(), "skipping speech chunk");
                    }
                }
                InboundEvent::Interrupted => {
                    let stopped = self.interrupt_playback();
                    tracing::debug!(stopped, "barge-in");
                }
                InboundEvent::ToolCalls(calls) => self.spawn_tool_batch(epoch, &link, calls),
                InboundEvent::Closed { reason } => {
                    self.remote_closed(epoch, &link, reason.as_deref());
                    return;
                }
                InboundEvent::Error(message) => {
                    link.close();
                    self.fail(epoch, &ConnectionError::Transport(message));
                    return;
                }
            }
        }

        if liveness.is_live() {
            self.remote_closed(epoch, &link, None);
        }
    }

    /// Run a batch of tool calls in order off the event loop
    fn spawn_tool_batch(&self, epoch: u64, link: &LiveLink, calls: Vec<ToolCall>) {
        let dispatcher = Arc::clone(&self.inner.dispatcher);
        let link = link.clone();
        let task = tokio::spawn(async move {
            for call in calls {
                let result = dispatcher.dispatch(&call).await;
                if !link.is_live() {
                    tracing::debug!(tool = %call.name, "session gone, dropping tool response");
                    continue;
                }
                link.send_tool_response(call.id, call.name, result.to_response());
            }
        });

        let mut core = self.core();
        if core.epoch == epoch {
            core.track(task.abort_handle());
        } else {
            task.abort();
        }
    }
}

/// Builder for [`SessionController`]
///
/// Anything not supplied falls back to the real implementation.
pub struct SessionBuilder {
    session: SessionConfig,
    api_key: Option<SecretString>,
    reconnect: ReconnectPolicy,
    transport: Option<Arc<dyn Transport>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    audio: Option<Arc<dyn AudioBackend>>,
    host: Option<Arc<dyn HostServices>>,
    chat: Option<Arc<dyn ChatBackend>>,
    output: OutputBus,
    search_url: String,
    location_timeout: Duration,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("session", &self.session)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

impl SessionBuilder {
    fn new(session: SessionConfig) -> Self {
        Self {
            session,
            api_key: None,
            reconnect: ReconnectPolicy::default(),
            transport: None,
            connectivity: None,
            audio: None,
            host: None,
            chat: None,
            output: OutputBus::default(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
        }
    }

    /// API key for the realtime session and text channel
    #[must_use]
    pub fn api_key(mut self, key: Option<SecretString>) -> Self {
        self.api_key = key;
        self
    }

    /// Backoff policy
    #[must_use]
    pub const fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Realtime transport
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Connectivity probe
    #[must_use]
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Audio device backend
    #[must_use]
    pub fn audio(mut self, audio: Arc<dyn AudioBackend>) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Host services used by tools
    #[must_use]
    pub fn host(mut self, host: Arc<dyn HostServices>) -> Self {
        self.host = Some(host);
        self
    }

    /// Text channel backend
    #[must_use]
    pub fn chat_backend(mut self, chat: Arc<dyn ChatBackend>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Output bus (clock and gain) shared with the speaker stream
    #[must_use]
    pub fn output(mut self, output: OutputBus) -> Self {
        self.output = output;
        self
    }

    /// Prefix for `search_web` URLs
    #[must_use]
    pub fn search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    /// Upper bound on location queries
    #[must_use]
    pub const fn location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> SessionController {
        let observers = Arc::new(Observers::new());
        let host = self
            .host
            .unwrap_or_else(|| Arc::new(SystemHost::default()));
        let dispatcher = Arc::new(
            ToolDispatcher::new(host, Arc::clone(&observers), self.output.clone())
                .with_search_url(self.search_url)
                .with_location_timeout(self.location_timeout),
        );
        let chat = self
            .chat
            .unwrap_or_else(|| Arc::new(HttpChatBackend::new(DEFAULT_TEXT_URL)));
        let text = TextChannel::new(
            chat,
            Arc::clone(&dispatcher),
            Arc::clone(&observers),
            self.session.clone(),
            self.api_key.clone(),
        );

        SessionController {
            inner: Arc::new(Inner {
                transport: self
                    .transport
                    .unwrap_or_else(|| Arc::new(WebSocketTransport::new(DEFAULT_LIVE_URL))),
                connectivity: self
                    .connectivity
                    .unwrap_or_else(|| Arc::new(RouteProbe::default())),
                audio: self
                    .audio
                    .unwrap_or_else(|| Arc::new(CpalBackend::default())),
                capture: Arc::new(CaptureEncoder::new(Arc::clone(&observers))),
                scheduler: Mutex::new(PlaybackScheduler::new(self.output.clone())),
                output: self.output,
                observers,
                dispatcher,
                text,
                session: self.session,
                api_key: self.api_key,
                core: Mutex::new(Core {
                    state: SessionState::Disconnected,
                    policy: self.reconnect,
                    epoch: 0,
                    link: None,
                    input: None,
                    output: None,
                    retry: None,
                    tasks: Vec::new(),
                }),
            }),
        }
    }
}
