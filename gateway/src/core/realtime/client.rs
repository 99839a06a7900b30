//! Realtime WebSocket session against the AI Gateway or the provider directly.
//!
//! # Authentication
//!
//! The handshake offers the subprotocol list built by
//! [`GatewayConfig::build_websocket_subprotocols`]. Over this transport the
//! gateway only accepts the inline provider key (`insecure-api-key.<key>`);
//! offering the gateway token alone gets the socket closed with 4001 shortly
//! after the upgrade. Both encodings are supported so the difference can be
//! observed.
//!
//! # Example
//!
//! ```rust,no_run
//! use aig_probe::config::GatewayConfig;
//! use aig_probe::core::realtime::{RealtimeClient, RealtimeEvent, SessionOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RealtimeClient::new(GatewayConfig::from_env()?, SessionOptions::default());
//! let mut events = client.events().expect("events taken once");
//!
//! client.connect().await?;
//! client.send_text("Say hello").await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         RealtimeEvent::TextDelta { delta } => print!("{delta}"),
//!         RealtimeEvent::ResponseDone { .. } | RealtimeEvent::Closed { .. } => break,
//!         _ => {}
//!     }
//! }
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::base::{CLOSE_ABNORMAL, CLOSE_NORMAL, CloseDiagnosis, ConnectionState, RealtimeEvent};
use super::config::SessionOptions;
use super::messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig};
use crate::config::GatewayConfig;
use crate::core::audio::AudioCapture;
use crate::core::conversation::{ConversationLog, Message};
use crate::core::error::{GatewayError, GatewayResult};

/// Channel capacity for outbound client events.
const WS_CHANNEL_CAPACITY: usize = 256;

/// How long `disconnect` waits for the socket task to send its close frame.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code reported when the server sent a close frame without a status.
const CLOSE_NO_STATUS: u16 = 1005;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Event Stream
// =============================================================================

/// Ordered stream of inbound [`RealtimeEvent`]s.
///
/// Events are buffered from construction of the client, so nothing is lost
/// between `connect` and the first poll.
pub struct RealtimeEvents {
    rx: mpsc::UnboundedReceiver<RealtimeEvent>,
}

impl RealtimeEvents {
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.recv().await
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for RealtimeEvents {
    type Item = RealtimeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// =============================================================================
// Shared State
// =============================================================================

#[derive(Default)]
struct Session {
    state: ConnectionState,
    /// Bumped on every connect attempt so a stale socket task never
    /// overwrites the state of a newer session.
    epoch: u64,
    outbound: Option<mpsc::Sender<ClientEvent>>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

struct Recording {
    capture: Box<dyn AudioCapture>,
    forwarder: JoinHandle<()>,
}

struct Shared {
    session: Mutex<Session>,
    log: Mutex<ConversationLog>,
    /// User turns sent with `send_text` that no response has started for yet.
    /// Locked after `log` when both are needed.
    unanswered: Mutex<VecDeque<Message>>,
    events: mpsc::UnboundedSender<RealtimeEvent>,
    recording: tokio::sync::Mutex<Option<Recording>>,
}

impl Shared {
    fn emit(&self, event: RealtimeEvent) {
        // The receiver may have been dropped by the caller
        let _ = self.events.send(event);
    }

    /// Mark the session identified by `epoch` disconnected. No-op when the
    /// session was already torn down or replaced.
    fn finish(&self, epoch: u64) -> bool {
        let mut session = self.session.lock();
        if session.epoch != epoch || session.state == ConnectionState::Disconnected {
            return false;
        }
        *session = Session {
            epoch,
            ..Default::default()
        };
        true
    }

    /// Log a user turn that is waiting for its response.
    fn append_user_turn(&self, message: Message) {
        let mut log = self.log.lock();
        log.append(message.clone());
        self.unanswered.lock().push_back(message);
    }

    /// A response started, answering the oldest waiting user turn.
    fn mark_answered(&self) {
        self.unanswered.lock().pop_front();
    }

    /// Roll back one waiting user turn. No-op when it was already answered
    /// or already rolled back by the socket task.
    fn retract_user_turn(&self, message: &Message) {
        let mut log = self.log.lock();
        let mut unanswered = self.unanswered.lock();
        if let Some(pos) = unanswered.iter().rposition(|m| m == message) {
            unanswered.remove(pos);
            log.retract(message);
        }
    }

    /// Roll back every user turn that never got a response.
    fn retract_unanswered(&self) -> usize {
        let mut log = self.log.lock();
        let pending: Vec<Message> = self.unanswered.lock().drain(..).collect();
        pending.iter().rev().filter(|m| log.retract(m)).count()
    }

    /// Stop the active capture, if any. Returns whether one was active.
    async fn release_capture(&self) -> bool {
        let recording = self.recording.lock().await.take();
        match recording {
            Some(mut recording) => {
                recording.forwarder.abort();
                recording.capture.stop().await;
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// Realtime Client
// =============================================================================

/// One realtime session with its own conversation log.
///
/// All methods take `&self`; connect attempts are serialized by an atomic
/// check-and-set on the session state, so concurrent `connect` calls open at
/// most one socket.
pub struct RealtimeClient {
    config: GatewayConfig,
    options: SessionOptions,
    shared: Arc<Shared>,
    events: Mutex<Option<mpsc::UnboundedReceiver<RealtimeEvent>>>,
}

impl RealtimeClient {
    pub fn new(config: GatewayConfig, options: SessionOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            options,
            shared: Arc::new(Shared {
                session: Mutex::new(Session::default()),
                log: Mutex::new(ConversationLog::new()),
                unanswered: Mutex::new(VecDeque::new()),
                events: events_tx,
                recording: tokio::sync::Mutex::new(None),
            }),
            events: Mutex::new(Some(events_rx)),
        }
    }

    /// Take the inbound event stream. Returns `None` after the first call.
    pub fn events(&self) -> Option<RealtimeEvents> {
        self.events.lock().take().map(|rx| RealtimeEvents { rx })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.session.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Copy of the conversation so far.
    pub fn conversation(&self) -> Vec<Message> {
        self.shared.log.lock().snapshot()
    }

    pub fn reset_conversation(&self) {
        let mut log = self.shared.log.lock();
        log.clear();
        self.shared.unanswered.lock().clear();
    }

    /// Open the socket and announce the session.
    ///
    /// A no-op returning the current state unless the session is
    /// disconnected. `session.update` is written before any other traffic.
    /// Handshake failures return [`GatewayError::Connect`] carrying a
    /// [`CloseDiagnosis`] when one applies.
    pub async fn connect(&self) -> GatewayResult<ConnectionState> {
        let (epoch, cancel) = {
            let mut session = self.shared.session.lock();
            if session.state != ConnectionState::Disconnected {
                debug!("connect() ignored: session is {}", session.state);
                return Ok(session.state);
            }
            session.epoch += 1;
            session.state = ConnectionState::Connecting;
            let cancel = CancellationToken::new();
            session.cancel = Some(cancel.clone());
            (session.epoch, cancel)
        };

        match self.open(epoch, &cancel).await {
            Ok(state) => Ok(state),
            Err(e) => {
                self.shared.finish(epoch);
                Err(e)
            }
        }
    }

    async fn open(&self, epoch: u64, cancel: &CancellationToken) -> GatewayResult<ConnectionState> {
        let url = self
            .config
            .derive_websocket_base_url(Some(&self.options.model))?;
        let protocols = self.config.build_websocket_subprotocols();

        let mut request = url.as_str().into_client_request().map_err(|e| {
            GatewayError::Configuration(format!("Invalid WebSocket request: {e}"))
        })?;
        let offer = HeaderValue::from_str(&protocols.join(", ")).map_err(|_| {
            GatewayError::Configuration(
                "subprotocol list contains characters not valid in a header".to_string(),
            )
        })?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, offer);

        info!(
            target_kind = %self.config.target,
            insecure_subprotocol = self.config.insecure_subprotocol,
            offered = protocols.len(),
            "Connecting realtime session to {}",
            url
        );

        let handshake = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Realtime connect abandoned: disconnect requested during handshake");
                return Ok(ConnectionState::Disconnected);
            }
            result = connect_async(request) => result,
        };

        let (mut ws, response) = handshake.map_err(|e| {
            let diagnosis = CloseDiagnosis::from_handshake_error(&e);
            match diagnosis {
                Some(d) => warn!("Realtime handshake failed: {} ({})", e, d),
                None => warn!("Realtime handshake failed: {}", e),
            }
            GatewayError::Connect {
                diagnosis,
                message: e.to_string(),
            }
        })?;

        debug!(
            "Realtime handshake accepted (status {}, subprotocol {:?})",
            response.status(),
            response
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok())
        );

        let session_update = ClientEvent::SessionUpdate {
            session: SessionConfig::from_options(&self.options, &self.config.voice),
        };
        if let Err(e) = ws.send(WsMessage::Text(session_update.encode()?.into())).await {
            return Err(GatewayError::Connect {
                diagnosis: CloseDiagnosis::from_handshake_error(&e),
                message: format!("failed to send session.update: {e}"),
            });
        }

        let (tx, rx) = mpsc::channel(WS_CHANNEL_CAPACITY);
        let mut pending = Some(ws);
        {
            let mut session = self.shared.session.lock();
            if session.epoch == epoch && session.state == ConnectionState::Connecting {
                if let Some(ws) = pending.take() {
                    session.task = Some(tokio::spawn(run_session(
                        ws,
                        rx,
                        cancel.clone(),
                        self.shared.clone(),
                        epoch,
                    )));
                }
                session.state = ConnectionState::Connected;
                session.outbound = Some(tx);
            }
        }

        match pending {
            None => {
                info!("Realtime session connected");
                Ok(ConnectionState::Connected)
            }
            Some(mut ws) => {
                info!("Realtime session disconnected during handshake, closing socket");
                if let Err(e) = ws.close(Some(normal_close())).await {
                    debug!("Close after abandoned handshake failed: {}", e);
                }
                Ok(ConnectionState::Disconnected)
            }
        }
    }

    /// Close the socket and release the audio capture. Safe from any state.
    pub async fn disconnect(&self) -> GatewayResult<()> {
        let (previous, cancel, task) = {
            let mut session = self.shared.session.lock();
            let previous = session.state;
            session.state = ConnectionState::Disconnected;
            session.outbound = None;
            (previous, session.cancel.take(), session.task.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(mut task) = task {
            if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut task).await.is_err() {
                warn!("Realtime session task did not stop in time, aborting");
                task.abort();
            }
        }
        if self.shared.release_capture().await {
            debug!("Audio capture released on disconnect");
        }

        if previous != ConnectionState::Disconnected {
            info!("Realtime session disconnected (was {})", previous);
        }
        Ok(())
    }

    fn outbound(&self) -> GatewayResult<mpsc::Sender<ClientEvent>> {
        let session = self.shared.session.lock();
        match (session.state, &session.outbound) {
            (ConnectionState::Connected, Some(tx)) => Ok(tx.clone()),
            (state, _) => Err(GatewayError::IllegalState(format!(
                "realtime session is {state}, not connected"
            ))),
        }
    }

    /// Append a user message and ask for a response.
    ///
    /// The user turn is rolled back if the socket closes before a response
    /// to it starts.
    pub async fn send_text(&self, text: &str) -> GatewayResult<()> {
        let outbound = self.outbound()?;
        self.shared.append_user_turn(Message::user(text));

        let sent = outbound
            .send(ClientEvent::ConversationItemCreate {
                item: ConversationItem::user_text(text),
            })
            .await
            .is_ok()
            && outbound.send(ClientEvent::ResponseCreate).await.is_ok();

        if !sent {
            self.shared.retract_user_turn(&Message::user(text));
            return Err(session_closed());
        }
        debug!("Queued user message ({} chars)", text.len());
        Ok(())
    }

    /// Queue a PCM16 chunk. Does not request a response.
    pub async fn append_audio(&self, audio: &[u8]) -> GatewayResult<()> {
        self.outbound()?
            .send(ClientEvent::audio_append(audio))
            .await
            .map_err(|_| session_closed())
    }

    /// Commit buffered audio as a user turn and request a response.
    pub async fn commit_audio_and_respond(&self) -> GatewayResult<()> {
        let outbound = self.outbound()?;
        outbound
            .send(ClientEvent::InputAudioBufferCommit)
            .await
            .map_err(|_| session_closed())?;
        outbound
            .send(ClientEvent::ResponseCreate)
            .await
            .map_err(|_| session_closed())
    }

    /// Start streaming `capture` into the input audio buffer.
    pub async fn start_recording(&self, mut capture: Box<dyn AudioCapture>) -> GatewayResult<()> {
        let outbound = self.outbound()?;
        {
            let mut recording = self.shared.recording.lock().await;
            if recording.is_some() {
                return Err(GatewayError::IllegalState(
                    "audio capture is already active".to_string(),
                ));
            }

            let mut chunks = capture.start().await?;
            let forwarder = tokio::spawn(async move {
                while let Some(chunk) = chunks.recv().await {
                    if outbound.send(ClientEvent::audio_append(&chunk)).await.is_err() {
                        break;
                    }
                }
            });
            *recording = Some(Recording { capture, forwarder });
        }

        // The socket may have closed while the capture was starting
        if !self.is_connected() {
            self.shared.release_capture().await;
            return Err(GatewayError::IllegalState(
                "realtime session closed while starting audio capture".to_string(),
            ));
        }
        info!("Audio capture started");
        Ok(())
    }

    /// Stop the capture, commit what was recorded and request a response.
    pub async fn stop_recording(&self) -> GatewayResult<()> {
        if !self.shared.release_capture().await {
            return Err(GatewayError::IllegalState(
                "no audio capture is active".to_string(),
            ));
        }
        info!("Audio capture stopped");
        self.commit_audio_and_respond().await
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(cancel) = self.shared.session.lock().cancel.take() {
            cancel.cancel();
        }
    }
}

fn session_closed() -> GatewayError {
    GatewayError::Transport("realtime session closed before the event was sent".to_string())
}

fn normal_close() -> CloseFrame {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    }
}

// =============================================================================
// Socket Task
// =============================================================================

async fn run_session(
    ws: WsStream,
    mut outbound: mpsc::Receiver<ClientEvent>,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    epoch: u64,
) {
    let (mut sink, mut stream) = ws.split();
    let mut folder = ResponseFolder::default();

    let (code, reason) = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(WsMessage::Close(Some(normal_close()))).await {
                    debug!("Failed to send close frame: {}", e);
                }
                break (CLOSE_NORMAL, "client disconnect".to_string());
            }

            Some(event) = outbound.recv() => {
                let frame = match event.encode() {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to encode {}: {}", event.event_type(), e);
                        continue;
                    }
                };
                trace!("Sending {}", event.event_type());
                if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                    error!("Failed to send realtime event: {}", e);
                    break (CLOSE_ABNORMAL, e.to_string());
                }
            }

            msg = stream.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => folder.handle_frame(text.as_str(), &shared),
                Some(Ok(WsMessage::Close(frame))) => {
                    break match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = sink.send(WsMessage::Pong(data)).await {
                        error!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Realtime socket error: {}", e);
                    break (CLOSE_ABNORMAL, e.to_string());
                }
                None => break (CLOSE_ABNORMAL, "connection dropped".to_string()),
            },
        }
    };

    // Anything still queued is never sent
    outbound.close();
    folder.flush(&shared);
    let retracted = shared.retract_unanswered();
    if retracted > 0 {
        warn!("Rolled back {} unanswered user turn(s)", retracted);
    }
    if shared.release_capture().await {
        debug!("Audio capture released after socket close");
    }

    match CloseDiagnosis::from_close_code(code) {
        Some(diagnosis) => warn!(code, "Realtime socket closed: {}", diagnosis),
        None => info!(code, "Realtime socket closed"),
    }

    shared.finish(epoch);
    shared.emit(RealtimeEvent::closed(code, reason));
}

// =============================================================================
// Inbound Folding
// =============================================================================

/// Folds assistant deltas into one log entry per response.
#[derive(Default)]
struct ResponseFolder {
    pending: String,
    /// Set by `conversation.interrupted`; deltas are dropped until the next response
    interrupted: bool,
    /// Log position of each spoken user item whose transcription is still due
    transcript_slots: Vec<(String, usize)>,
}

impl ResponseFolder {
    fn handle_frame(&mut self, text: &str, shared: &Shared) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => self.handle_event(event, shared),
            Err(e) => {
                let err = GatewayError::from(e);
                warn!("Skipping realtime frame: {}", err);
            }
        }
    }

    fn handle_event(&mut self, event: ServerEvent, shared: &Shared) {
        match event {
            ServerEvent::SessionCreated { session } => {
                info!(
                    model = session.model.as_deref().unwrap_or("unknown"),
                    "Realtime session created: {}",
                    session.id
                );
                shared.emit(RealtimeEvent::SessionCreated {
                    session_id: session.id,
                    model: session.model,
                    voice: session.voice,
                });
            }

            ServerEvent::SessionUpdated { .. } => {
                debug!("Realtime session updated");
                shared.emit(RealtimeEvent::SessionUpdated);
            }

            ServerEvent::ResponseCreated { response } => {
                self.pending.clear();
                self.interrupted = false;
                shared.mark_answered();
                shared.emit(RealtimeEvent::ResponseCreated {
                    response_id: response.id,
                });
            }

            ServerEvent::TextDelta { delta, .. } => {
                if !self.interrupted {
                    self.pending.push_str(&delta);
                }
                shared.emit(RealtimeEvent::TextDelta { delta });
            }

            ServerEvent::TextDone { text, .. } => {
                self.complete(&text, shared);
                shared.emit(RealtimeEvent::TextDone { text });
            }

            ServerEvent::AudioTranscriptDelta { delta, .. } => {
                if !self.interrupted {
                    self.pending.push_str(&delta);
                }
                shared.emit(RealtimeEvent::AudioTranscriptDelta { delta });
            }

            ServerEvent::AudioTranscriptDone { transcript, .. } => {
                self.complete(&transcript, shared);
                shared.emit(RealtimeEvent::AudioTranscriptDone { transcript });
            }

            ServerEvent::AudioDelta { delta, .. } => match ServerEvent::decode_audio_delta(&delta) {
                Ok(audio) => shared.emit(RealtimeEvent::AudioDelta {
                    audio: Bytes::from(audio),
                }),
                Err(e) => {
                    let err = GatewayError::ProtocolDecode(format!("audio delta: {e}"));
                    warn!("Skipping realtime frame: {}", err);
                }
            },

            ServerEvent::ResponseDone { response } => {
                if !self.interrupted {
                    self.flush(shared);
                }
                self.interrupted = false;
                if let Some(usage) = &response.usage {
                    debug!(
                        "Response {} done: {} input / {} output tokens",
                        response.id, usage.input_tokens, usage.output_tokens
                    );
                }
                shared.emit(RealtimeEvent::ResponseDone {
                    response_id: response.id,
                    status: response.status,
                });
            }

            ServerEvent::ConversationInterrupted => {
                debug!("Conversation interrupted, keeping {} chars", self.pending.len());
                self.flush(shared);
                self.interrupted = true;
                shared.emit(RealtimeEvent::ConversationInterrupted);
            }

            ServerEvent::ConversationItemCreated { item } => {
                let spoken = item.role.as_deref() == Some("user")
                    && item.content.iter().any(|part| part.content_type == "input_audio");
                if let (true, Some(id)) = (spoken, item.id.as_ref()) {
                    let position = shared.log.lock().len();
                    self.transcript_slots.push((id.clone(), position));
                }
                shared.emit(RealtimeEvent::ItemCreated {
                    item_id: item.id,
                    role: item.role,
                });
            }

            ServerEvent::TranscriptionCompleted {
                item_id,
                transcript,
            } => {
                let slot = self
                    .transcript_slots
                    .iter()
                    .position(|(id, _)| item_id.as_deref() == Some(id.as_str()))
                    .map(|i| self.transcript_slots.remove(i).1);
                if !transcript.trim().is_empty() {
                    let mut log = shared.log.lock();
                    match slot {
                        // Keep the spoken turn ahead of the answer it triggered
                        Some(position) => {
                            log.insert(position, Message::user(transcript.clone()));
                            for (_, later) in self.transcript_slots.iter_mut() {
                                if *later >= position {
                                    *later += 1;
                                }
                            }
                        }
                        None => log.append(Message::user(transcript.clone())),
                    }
                }
                shared.emit(RealtimeEvent::InputTranscriptionCompleted {
                    item_id,
                    transcript,
                });
            }

            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                shared.emit(RealtimeEvent::SpeechStarted { audio_start_ms });
            }

            ServerEvent::SpeechStopped { audio_end_ms, .. } => {
                shared.emit(RealtimeEvent::SpeechStopped { audio_end_ms });
            }

            ServerEvent::Error { error } => {
                error!(
                    "Realtime error event: {} - {}",
                    error.error_type, error.message
                );
                shared.emit(RealtimeEvent::Error {
                    error_type: error.error_type,
                    code: error.code,
                    message: error.message,
                });
            }

            ServerEvent::Unknown => {
                trace!("Ignoring unhandled realtime event");
            }
        }
    }

    /// A `*.done` event: prefer the server's full text over the accumulated deltas.
    fn complete(&mut self, full: &str, shared: &Shared) {
        if self.interrupted {
            return;
        }
        if !full.is_empty() {
            self.pending.clear();
            self.pending.push_str(full);
        }
        self.flush(shared);
    }

    /// Append whatever has been accumulated as one assistant message.
    fn flush(&mut self, shared: &Shared) {
        if self.pending.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.pending);
        shared.log.lock().append(Message::assistant(content.clone()));
        shared.emit(RealtimeEvent::AssistantMessage { content });
    }
}
