//! Agent session: owns the socket and its state machine.
//!
//! `Session` is a cheap, clonable handle. Connecting spawns two tasks:
//!
//! ```text
//!           Session::send ──► mpsc ──► [writer task] ──► WebSocket
//!                                                          │
//!  TerminalEvent / PendingTable ◄── Router ◄── [reader task] ◄┘
//! ```
//!
//! The reader task is the only inbound path, so frames are handled in
//! arrival order and the pending table is never mutated by two inbound
//! frames at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::{fmt, io};

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::codec::Outbound;
use crate::error::OmniError;
use crate::network::router::{ExtensionHandler, Router};
use crate::protocol::TerminalEvent;
use crate::state::{ConnectionState, PendingTable};
use crate::terminal::Terminal;
use crate::transfer::FileTransfer;

// ── SessionConfig ────────────────────────────────────────────────

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Server base URL, e.g. `https://host/`. `http(s)` becomes `ws(s)`.
    pub base_url: String,
    /// Agent name; selects the agent on the server.
    pub agent_name: String,
    /// Disambiguates agents sharing a name.
    pub agent_id: Option<u64>,
    /// Credential sent as the `api_key` query parameter.
    pub api_key: String,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("base_url", &self.base_url)
            .field("agent_name", &self.agent_name)
            .field("agent_id", &self.agent_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl SessionConfig {
    pub fn new(
        base_url: impl Into<String>,
        agent_name: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            agent_name: agent_name.into(),
            agent_id: None,
            api_key: api_key.into(),
        }
    }

    pub fn with_agent_id(mut self, agent_id: u64) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// `ws(s)://host/<prefix>/api/agent/<name>/omni/?api_key=…[&agent_id=…]`
    pub fn url(&self) -> Result<Url, OmniError> {
        let mut url = Url::parse(&self.base_url)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(OmniError::UnsupportedUrl(format!("scheme {other}"))),
        };
        url.set_scheme(scheme)
            .map_err(|_| OmniError::UnsupportedUrl(self.base_url.clone()))?;

        url.path_segments_mut()
            .map_err(|_| OmniError::UnsupportedUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "agent", self.agent_name.as_str(), "omni", ""]);

        {
            let mut query = url.query_pairs_mut();
            query.clear().append_pair("api_key", &self.api_key);
            if let Some(id) = self.agent_id {
                query.append_pair("agent_id", &id.to_string());
            }
        }
        Ok(url)
    }
}

// ── Session ──────────────────────────────────────────────────────

type Outcome = Result<(), Arc<OmniError>>;

/// The connect attempt in flight. Every concurrent `connect()` awaits
/// the same `outcome`; `close()` fires `abort`.
struct Attempt {
    outcome: Shared<BoxFuture<'static, Outcome>>,
    abort: CancellationToken,
}

struct SessionInner {
    config: SessionConfig,
    state: Mutex<ConnectionState>,
    attempt: Mutex<Option<Attempt>>,
    /// Identifies the current socket instance; stale reader tasks
    /// compare against it before touching shared state.
    generation: AtomicU64,
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: PendingTable,
    router: Router,
    terminal_tx: mpsc::UnboundedSender<TerminalEvent>,
    terminal_rx: Mutex<Option<mpsc::UnboundedReceiver<TerminalEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionInner {
    fn emit(&self, event: TerminalEvent) {
        let _ = self.terminal_tx.send(event);
    }

    /// Tear down socket `generation` if it is still the current one.
    fn socket_ended(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let was_open = {
            let mut state = lock(&self.state);
            state.closed().is_ok()
        };
        lock(&self.writer).take();
        let failed = self.pending.fail_all();
        if was_open {
            info!(agent = %self.config.agent_name, failed, "connection closed");
            self.emit(TerminalEvent::Disconnected);
        }
    }
}

/// One agent session: a socket plus its router and pending table.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .field("pending", &self.inner.pending)
            .finish()
    }
}

impl Session {
    /// Create a session in the `Idle` state. Nothing is opened until
    /// [`connect`](Self::connect).
    pub fn new(config: SessionConfig) -> Self {
        let pending = PendingTable::new();
        let (terminal_tx, terminal_rx) = mpsc::unbounded_channel();
        let router = Router::new(
            config.agent_name.as_str(),
            pending.clone(),
            terminal_tx.clone(),
        );

        Self {
            inner: Arc::new(SessionInner {
                config,
                state: Mutex::new(ConnectionState::Idle),
                attempt: Mutex::new(None),
                generation: AtomicU64::new(0),
                writer: Mutex::new(None),
                pending,
                router,
                terminal_tx,
                terminal_rx: Mutex::new(Some(terminal_rx)),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn agent_name(&self) -> &str {
        &self.inner.config.agent_name
    }

    /// Snapshot of the connection state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.state).clone()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner.state).is_open()
    }

    /// Outstanding correlated requests.
    pub fn pending(&self) -> &PendingTable {
        &self.inner.pending
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Take the terminal event stream. Only the first call gets it.
    pub fn take_terminal_events(&self) -> Option<mpsc::UnboundedReceiver<TerminalEvent>> {
        lock(&self.inner.terminal_rx).take()
    }

    /// Register a handler for frames with tags the core does not know.
    pub fn add_extension_handler(&self, handler: impl ExtensionHandler + 'static) {
        self.inner.router.add_extension_handler(handler);
    }

    pub fn terminal(&self) -> Terminal<'_> {
        Terminal::new(self)
    }

    pub fn files(&self) -> FileTransfer<'_> {
        FileTransfer::new(self)
    }

    // ── Connection management ────────────────────────────────────

    /// Open the socket. Idempotent: returns `Ok` at once if already
    /// open. While an attempt is in flight every caller awaits that same
    /// attempt, and a failure reaches all of them as
    /// [`OmniError::ConnectFailed`].
    ///
    /// On failure the state returns to `Idle`; nothing retries
    /// automatically.
    pub async fn connect(&self) -> Result<(), OmniError> {
        let outcome = {
            let mut slot = lock(&self.inner.attempt);
            match slot.as_ref() {
                Some(attempt) => attempt.outcome.clone(),
                None => {
                    if self.is_open() {
                        return Ok(());
                    }
                    let url = self.inner.config.url()?;
                    lock(&self.inner.state).begin_connect()?;

                    let abort = CancellationToken::new();
                    let task = tokio::spawn(self.clone().establish(url, abort.clone()));
                    let outcome = async move {
                        task.await
                            .unwrap_or_else(|e| Err(Arc::new(OmniError::Io(io::Error::other(e)))))
                    }
                    .boxed()
                    .shared();
                    *slot = Some(Attempt {
                        outcome: outcome.clone(),
                        abort,
                    });
                    outcome
                }
            }
        };
        outcome.await.map_err(OmniError::ConnectFailed)
    }

    /// Run one attempt to completion. Runs as its own task so a caller
    /// dropping its `connect()` future cannot strand the state in
    /// `Connecting`.
    async fn establish(self, url: Url, abort: CancellationToken) -> Outcome {
        info!(agent = %self.agent_name(), host = ?url.host_str(), "connecting");
        let handshake = tokio::select! {
            _ = abort.cancelled() => Err(OmniError::ConnectAborted),
            result = tokio_tungstenite::connect_async(url.as_str()) => {
                result.map(|(stream, _response)| stream).map_err(OmniError::from)
            }
        };
        let result = handshake.and_then(|stream| self.attach(stream, &abort));

        if let Err(e) = &result {
            warn!(agent = %self.agent_name(), "connect failed: {e}");
            let _ = lock(&self.inner.state).connect_failed();
        }
        // The state is final before the slot clears, so the next
        // `connect()` starts from `Idle` or `Open`.
        lock(&self.inner.attempt).take();
        result.map_err(Arc::new)
    }

    /// Drive an already-handshaken WebSocket. Expects `Connecting`.
    fn attach<S>(
        &self,
        stream: WebSocketStream<S>,
        abort: &CancellationToken,
    ) -> Result<(), OmniError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut source) = stream.split();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();
        let generation = {
            // A `close()` that lands after this block sees `Open` and
            // retires the generation taken here.
            let mut state = lock(&self.inner.state);
            if abort.is_cancelled() {
                return Err(OmniError::ConnectAborted);
            }
            state.opened()?;
            *lock(&self.inner.writer) = Some(writer_tx);
            self.inner.emit(TerminalEvent::Connected);
            self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        info!(agent = %self.agent_name(), "connected");

        // Writer task: Session -> Network
        tokio::spawn(async move {
            while let Some(message) = writer_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!("socket write error: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader task: Network -> Router
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match message {
                    Ok(Message::Binary(data)) => {
                        inner.router.dispatch(Bytes::from(data));
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "close frame received");
                        break;
                    }
                    Ok(Message::Text(text)) => {
                        debug!("ignoring text message ({} bytes)", text.len());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("socket read error: {e}");
                        break;
                    }
                }
            }
            if let Some(inner) = weak.upgrade() {
                inner.socket_ended(generation);
            }
        });

        Ok(())
    }

    /// Close the socket. Idempotent; outstanding requests fail with
    /// [`OmniError::ConnectionClosed`].
    ///
    /// During `Connecting` the attempt is aborted instead: its callers
    /// fail with [`OmniError::ConnectAborted`] as the cause and the state
    /// returns to `Idle`.
    pub fn close(&self) {
        if let Some(attempt) = lock(&self.inner.attempt).as_ref() {
            debug!(agent = %self.agent_name(), "aborting connect attempt");
            attempt.abort.cancel();
        }
        let was_open = lock(&self.inner.state).closed().is_ok();
        if !was_open {
            return;
        }
        // Retire the reader task's generation; this call does its cleanup.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(writer) = lock(&self.inner.writer).take() {
            let _ = writer.send(Message::Close(None));
        }
        self.inner.pending.fail_all();
        info!(agent = %self.agent_name(), "connection closed by client");
        self.inner.emit(TerminalEvent::Disconnected);
    }

    // ── Sending ──────────────────────────────────────────────────

    /// Encode and send a frame.
    ///
    /// With no live socket this is a silent no-op: delivery is only ever
    /// confirmed by a correlated response.
    pub fn send(&self, frame: Outbound) -> Result<(), OmniError> {
        let tag = frame.tag();
        let bytes = frame.encode()?;
        if !self.send_raw(bytes) {
            debug!(%tag, "no live socket; frame dropped");
        }
        Ok(())
    }

    /// Send pre-encoded bytes. Returns whether they were queued.
    pub fn send_raw(&self, frame: Bytes) -> bool {
        match lock(&self.inner.writer).as_ref() {
            Some(writer) => writer.send(Message::Binary(frame.to_vec())).is_ok(),
            None => false,
        }
    }
}
