//! Shared test utilities
//!
//! In-memory stand-ins for the transport, audio devices, host and chat
//! backend so the session core runs without network or hardware.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use aryan_core::config::SessionConfig;
use aryan_core::session::{
    Connectivity, InboundEvent, OUTBOUND_CAPACITY, OpenRequest, OpenedSession, OutboundMessage,
    ReconnectPolicy, SessionBuilder, Transport,
};
use aryan_core::text::{ChatBackend, ChatReply, ChatRequest};
use aryan_core::tools::{BatteryStatus, Coordinates, HostServices, ToolError};
use aryan_core::voice::{AudioBackend, AudioStream, FrameCallback, OutputBus};
use aryan_core::{ConnectionError, Error, LogEntry, SessionController, SessionState};

/// A usable test credential
pub fn api_key() -> Option<SecretString> {
    Some(SecretString::from("test-key".to_string()))
}

/// What the next `open` call does
#[derive(Debug, Clone)]
pub enum OpenOutcome {
    /// Hand back a live session
    Accept,
    /// Hand back a live session after a delay
    AcceptAfter(Duration),
    /// Fail with a transport error
    Reject(String),
    /// Never complete
    Hang,
}

/// The remote half of an accepted session
#[derive(Debug)]
pub struct RemoteEnd {
    /// What the client sent
    pub outbound: mpsc::Receiver<OutboundMessage>,
    /// Push events to the client
    pub inbound: mpsc::UnboundedSender<InboundEvent>,
}

impl RemoteEnd {
    /// Deliver an event to the client
    pub fn push(&self, event: InboundEvent) {
        let _ = self.inbound.send(event);
    }

    /// Drain whatever the client has sent so far
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.outbound.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// Transport that follows a script of outcomes
///
/// Once the script runs out every further call uses `fallback`.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<OpenOutcome>>,
    fallback: OpenOutcome,
    opens: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<OpenRequest>>,
    remotes: Mutex<Vec<RemoteEnd>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = OpenOutcome>, fallback: OpenOutcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            opens: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            remotes: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Accept every open
    pub fn accepting() -> Arc<Self> {
        Self::new([], OpenOutcome::Accept)
    }

    /// Reject every open
    pub fn rejecting() -> Arc<Self> {
        Self::new([], OpenOutcome::Reject("handshake refused".into()))
    }

    /// Times at which `open` was called
    pub fn opens(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<OpenRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Take the remote end of the most recent accepted session
    pub fn take_remote(&self) -> Option<RemoteEnd> {
        self.remotes.lock().unwrap().pop()
    }

    /// Session workers that are still running, one per accepted session
    pub fn running_workers(&self) -> usize {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .filter(|w| !w.is_finished())
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(
        &self,
        request: OpenRequest,
        _api_key: &SecretString,
    ) -> Result<OpenedSession, ConnectionError> {
        self.opens.lock().unwrap().push(Instant::now());
        self.requests.lock().unwrap().push(request);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if let OpenOutcome::AcceptAfter(delay) = &outcome {
            tokio::time::sleep(*delay).await;
        }

        match outcome {
            OpenOutcome::Accept | OpenOutcome::AcceptAfter(_) => {
                let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
                let (in_tx, in_rx) = mpsc::unbounded_channel();
                self.remotes.lock().unwrap().push(RemoteEnd {
                    outbound: out_rx,
                    inbound: in_tx,
                });
                // Stands in for a socket pump that never finishes on its own
                let worker = tokio::spawn(std::future::pending::<()>());
                let tasks = vec![worker.abort_handle()];
                self.workers.lock().unwrap().push(worker);
                Ok(OpenedSession {
                    outbound: out_tx,
                    inbound: in_rx,
                    tasks,
                })
            }
            OpenOutcome::Reject(message) => Err(ConnectionError::Transport(message)),
            OpenOutcome::Hang => std::future::pending().await,
        }
    }
}

/// Connectivity that tests can flip
#[derive(Debug)]
pub struct SwitchConnectivity(AtomicBool);

impl SwitchConnectivity {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(online)))
    }

    pub fn set(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for SwitchConnectivity {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct FakeStream {
    open: Arc<AtomicUsize>,
}

impl AudioStream for FakeStream {}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Audio backend that counts open streams and keeps the mic callback
pub struct FakeAudio {
    inputs_open: Arc<AtomicUsize>,
    outputs_open: Arc<AtomicUsize>,
    input_opens: AtomicUsize,
    output_opens: AtomicUsize,
    fail_input: AtomicBool,
    callback: Mutex<Option<FrameCallback>>,
}

impl FakeAudio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inputs_open: Arc::new(AtomicUsize::new(0)),
            outputs_open: Arc::new(AtomicUsize::new(0)),
            input_opens: AtomicUsize::new(0),
            output_opens: AtomicUsize::new(0),
            fail_input: AtomicBool::new(false),
            callback: Mutex::new(None),
        })
    }

    pub fn fail_input(&self, fail: bool) {
        self.fail_input.store(fail, Ordering::SeqCst);
    }

    pub fn inputs_open(&self) -> usize {
        self.inputs_open.load(Ordering::SeqCst)
    }

    pub fn outputs_open(&self) -> usize {
        self.outputs_open.load(Ordering::SeqCst)
    }

    pub fn input_opens(&self) -> usize {
        self.input_opens.load(Ordering::SeqCst)
    }

    pub fn output_opens(&self) -> usize {
        self.output_opens.load(Ordering::SeqCst)
    }

    /// Feed a frame through the most recently opened microphone callback
    pub fn feed(&self, frame: &[f32]) {
        if let Some(cb) = self.callback.lock().unwrap().as_mut() {
            cb(frame);
        }
    }
}

impl AudioBackend for FakeAudio {
    fn open_input(&self, callback: FrameCallback) -> aryan_core::Result<Box<dyn AudioStream>> {
        if self.fail_input.load(Ordering::SeqCst) {
            return Err(Error::Audio("microphone busy".into()));
        }
        self.input_opens.fetch_add(1, Ordering::SeqCst);
        self.inputs_open.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock().unwrap() = Some(callback);
        Ok(Box::new(FakeStream {
            open: Arc::clone(&self.inputs_open),
        }))
    }

    fn open_output(&self, _bus: OutputBus) -> aryan_core::Result<Box<dyn AudioStream>> {
        self.output_opens.fetch_add(1, Ordering::SeqCst);
        self.outputs_open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            open: Arc::clone(&self.outputs_open),
        }))
    }
}

/// Host with canned answers
#[derive(Debug, Default)]
pub struct FakeHost {
    pub opened: Mutex<Vec<String>>,
    pub note: Mutex<String>,
    pub hang_location: AtomicBool,
    pub no_battery: AtomicBool,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostServices for FakeHost {
    async fn open_url(&self, url: &str) -> Result<(), ToolError> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn battery(&self) -> Result<BatteryStatus, ToolError> {
        if self.no_battery.load(Ordering::SeqCst) {
            return Err(ToolError::Unavailable("battery".into()));
        }
        Ok(BatteryStatus {
            level: 76.0,
            charging: true,
        })
    }

    async fn location(&self) -> Result<Coordinates, ToolError> {
        if self.hang_location.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(Coordinates {
            lat: 28.6139,
            lon: 77.209,
        })
    }

    async fn workspace_note(&self) -> Result<String, ToolError> {
        Ok(self.note.lock().unwrap().clone())
    }
}

/// Chat backend replaying canned replies and recording requests
#[derive(Debug, Default)]
pub struct FakeChat {
    replies: Mutex<VecDeque<aryan_core::Result<ChatReply>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChat {
    pub fn new(replies: impl IntoIterator<Item = aryan_core::Result<ChatReply>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn send(
        &self,
        request: ChatRequest,
        _api_key: &SecretString,
    ) -> aryan_core::Result<ChatReply> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatReply::default()))
    }
}

/// Everything the observers saw
#[derive(Debug, Default)]
pub struct Recorder {
    pub states: Mutex<Vec<SessionState>>,
    pub logs: Mutex<Vec<LogEntry>>,
    pub volumes: Mutex<Vec<f32>>,
    pub tools: Mutex<Vec<String>>,
}

impl Recorder {
    /// Register on every observer of `controller`
    pub fn attach(controller: &SessionController) -> Arc<Self> {
        let recorder = Arc::new(Self::default());

        let r = Arc::clone(&recorder);
        controller.on_state_change(move |s| r.states.lock().unwrap().push(s));
        let r = Arc::clone(&recorder);
        controller.on_log(move |e| r.logs.lock().unwrap().push(e));
        let r = Arc::clone(&recorder);
        controller.on_volume(move |v| r.volumes.lock().unwrap().push(v));
        let r = Arc::clone(&recorder);
        controller.on_tool_action(move |name| r.tools.lock().unwrap().push(name.to_string()));

        recorder
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn tools(&self) -> Vec<String> {
        self.tools.lock().unwrap().clone()
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.volumes.lock().unwrap().clone()
    }
}

/// The fakes behind a test controller
pub struct Harness {
    pub controller: SessionController,
    pub transport: Arc<ScriptedTransport>,
    pub audio: Arc<FakeAudio>,
    pub host: Arc<FakeHost>,
    pub connectivity: Arc<SwitchConnectivity>,
    pub recorder: Arc<Recorder>,
}

/// Builder preloaded with fakes; `configure` may override any of them
pub fn harness_with(
    transport: Arc<ScriptedTransport>,
    configure: impl FnOnce(SessionBuilder) -> SessionBuilder,
) -> Harness {
    let audio = FakeAudio::new();
    let host = FakeHost::new();
    let connectivity = SwitchConnectivity::new(true);

    let builder = SessionController::builder(SessionConfig::default())
        .api_key(api_key())
        .reconnect(ReconnectPolicy::default())
        .transport(transport.clone())
        .connectivity(connectivity.clone())
        .audio(audio.clone())
        .host(host.clone())
        .chat_backend(FakeChat::new([]));
    let controller = configure(builder).build();
    let recorder = Recorder::attach(&controller);

    Harness {
        controller,
        transport,
        audio,
        host,
        connectivity,
        recorder,
    }
}

pub fn harness(transport: Arc<ScriptedTransport>) -> Harness {
    harness_with(transport, |b| b)
}

/// Let spawned tasks run without advancing paused time meaningfully
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Advance paused time and let woken tasks run
pub async fn advance(by: Duration) {
    tokio::time::advance(by).await;
    settle().await;
}
