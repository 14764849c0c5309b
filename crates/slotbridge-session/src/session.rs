//! Connection lifecycle, call correlation and reconnect handling.
//!
//! One spawned task owns the transport and all protocol state. Handles talk
//! to it over an mpsc command channel; calls resolve through oneshots, so a
//! caller always observes a typed outcome (a call outstanding when the
//! connection drops resolves with [`SessionError::ConnectionLost`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use slotbridge_core::config::UpstreamConfig;
use slotbridge_core::FrameDelimiter;

use crate::codec::{encode_frame, FrameBuffer};
use crate::error::SessionError;
use crate::message::{self, InboundMessage, Params};

/// Connection state, published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the session task.
#[derive(Debug)]
pub enum SessionEvent {
    /// Transport established; calls may now be issued.
    Connected,
    /// Transport lost (or connect attempt failed); a reconnect is scheduled
    /// unless the session was told to disconnect.
    Disconnected { reason: String },
    /// Unsolicited upstream push.
    Notification { name: String, body: Params },
}

/// Session tuning, normally derived from [`UpstreamConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub delimiter: FrameDelimiter,
    pub reconnect_delay: Duration,
    pub max_frame_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            delimiter: FrameDelimiter::Newline,
            reconnect_delay: Duration::from_secs(5),
            max_frame_len: 1024 * 1024,
        }
    }
}

impl From<&UpstreamConfig> for SessionConfig {
    fn from(cfg: &UpstreamConfig) -> Self {
        Self {
            delimiter: cfg.delimiter,
            reconnect_delay: cfg.reconnect_delay(),
            max_frame_len: cfg.max_frame_len,
        }
    }
}

/// Boxed bidirectional byte stream.
pub type BoxedIo = Box<dyn Io + Send>;

pub trait Io: AsyncRead + AsyncWrite + Unpin {}
impl<T: AsyncRead + AsyncWrite + Unpin> Io for T {}

/// Transport factory, injected so tests can dial in-memory streams.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self) -> std::io::Result<BoxedIo>;
}

/// Dials the configured upstream TCP endpoint.
pub struct TcpDialer {
    host: String,
    port: u16,
}

impl TcpDialer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> std::io::Result<BoxedIo> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

enum Command {
    Call {
        method: String,
        params: Params,
        reply: oneshot::Sender<Result<Value, SessionError>>,
    },
    Notify {
        name: String,
        params: Params,
    },
    Disconnect,
}

/// Cheap cloneable handle to the session task.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
    /// Issue a request and await its correlated response.
    ///
    /// Concurrent calls are allowed and may complete out of order; the
    /// correlation is by id, never by position.
    pub async fn call(&self, method: &str, params: Params) -> Result<Value, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Call {
                method: method.to_string(),
                params,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Send a fire-and-forget notification upstream.
    pub async fn notify(&self, name: &str, params: Params) -> Result<(), SessionError> {
        self.cmd_tx
            .send(Command::Notify {
                name: name.to_string(),
                params,
            })
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Tear the connection down and stop reconnecting.
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect).await;
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A watch receiver for state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

/// The session protocol engine.
pub struct Session;

impl Session {
    /// Spawn the session task. It dials immediately and keeps redialing after
    /// transport failures (with the configured delay) until every handle is
    /// dropped or [`SessionHandle::disconnect`] is called.
    ///
    /// The event channel is unbounded: the read loop must always make
    /// progress, even while the consumer is itself awaiting a call response
    /// and not draining events (a notification burst arriving mid-call must
    /// never stop response dispatch).
    pub fn spawn(
        config: SessionConfig,
        dialer: Arc<dyn Dialer>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let actor = Actor {
            config,
            dialer,
            cmd_rx,
            events: event_tx,
            state_tx,
            pending: Vec::new(),
            next_id: 0,
        };
        tokio::spawn(actor.run());

        (SessionHandle { cmd_tx, state_rx }, event_rx)
    }
}

struct PendingCall {
    id: String,
    reply: oneshot::Sender<Result<Value, SessionError>>,
}

/// Why a serve loop ended.
enum ServeExit {
    /// Transport-level failure; reconnect after the configured delay.
    Transport(String),
    /// Explicit disconnect; do not reconnect.
    Requested,
    /// All handles dropped; shut down.
    Closed,
}

struct Actor {
    config: SessionConfig,
    dialer: Arc<dyn Dialer>,
    cmd_rx: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state_tx: watch::Sender<ConnectionState>,
    pending: Vec<PendingCall>,
    next_id: u64,
}

impl Actor {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            match self.dialer.dial().await {
                Ok(io) => {
                    info!("upstream connection established");
                    self.set_state(ConnectionState::Connected);
                    let _ = self.events.send(SessionEvent::Connected);

                    let exit = self.serve(io).await;
                    self.fail_pending();
                    self.set_state(ConnectionState::Disconnected);
                    match exit {
                        ServeExit::Transport(reason) => {
                            warn!(%reason, "upstream connection lost");
                            let _ = self.events.send(SessionEvent::Disconnected { reason });
                        }
                        ServeExit::Requested => {
                            info!("upstream session disconnected on request");
                            let _ = self.events.send(SessionEvent::Disconnected {
                                reason: "disconnect requested".to_string(),
                            });
                            return;
                        }
                        ServeExit::Closed => return,
                    }
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    warn!(error = %e, "upstream connect attempt failed");
                    let _ = self.events.send(SessionEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
            }

            if !self.wait_before_retry().await {
                return;
            }
        }
    }

    /// Sit out the reconnect delay. Calls arriving meanwhile fail fast with
    /// `NotConnected`; a disconnect command (or all handles dropping) cancels
    /// the retry and returns `false`.
    async fn wait_before_retry(&mut self) -> bool {
        debug!(delay = ?self.config.reconnect_delay, "scheduling reconnect");
        let sleep = tokio::time::sleep(self.config.reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(Command::Disconnect) => return false,
                    Some(Command::Call { reply, .. }) => {
                        let _ = reply.send(Err(SessionError::NotConnected));
                    }
                    Some(Command::Notify { name, .. }) => {
                        debug!(%name, "dropping notification while disconnected");
                    }
                },
            }
        }
    }

    /// Drive one established connection until it ends.
    async fn serve(&mut self, io: BoxedIo) -> ServeExit {
        let (mut read_half, mut write_half) = tokio::io::split(io);
        let mut frames = FrameBuffer::new(self.config.delimiter, self.config.max_frame_len);
        let mut read_buf = vec![0u8; 4096];

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else { return ServeExit::Closed };
                    match cmd {
                        Command::Disconnect => return ServeExit::Requested,
                        Command::Call { method, params, reply } => {
                            let id = self.next_call_id();
                            let frame =
                                encode_frame(&message::request(&method, &id, params), self.config.delimiter);
                            // record before the bytes are flushed so a fast
                            // response can never race its own pending entry
                            debug!(%method, %id, "issuing upstream call");
                            self.pending.push(PendingCall { id, reply });
                            if let Err(e) = write_half.write_all(&frame).await {
                                return ServeExit::Transport(format!("write failed: {e}"));
                            }
                        }
                        Command::Notify { name, params } => {
                            let frame =
                                encode_frame(&message::notification(&name, params), self.config.delimiter);
                            if let Err(e) = write_half.write_all(&frame).await {
                                return ServeExit::Transport(format!("write failed: {e}"));
                            }
                        }
                    }
                }
                read = read_half.read(&mut read_buf) => match read {
                    Ok(0) => return ServeExit::Transport("connection closed by peer".to_string()),
                    Ok(n) => {
                        frames.extend(&read_buf[..n]);
                        loop {
                            match frames.next_frame() {
                                Ok(Some(frame)) => self.dispatch(&frame),
                                Ok(None) => break,
                                Err(e) => return ServeExit::Transport(e.to_string()),
                            }
                        }
                    }
                    Err(e) => return ServeExit::Transport(format!("read failed: {e}")),
                },
            }
        }
    }

    fn dispatch(&mut self, frame: &[u8]) {
        match InboundMessage::parse(frame) {
            Ok(InboundMessage::Response { id, body }) => {
                match self.pending.iter().position(|p| p.id == id) {
                    Some(pos) => {
                        let call = self.pending.remove(pos);
                        let _ = call.reply.send(message::response_result(body));
                    }
                    // inconsistency, not fatal: treat like an orphaned push
                    None => warn!(%id, "dropping response with no matching call"),
                }
            }
            Ok(InboundMessage::Notification { name, body }) => {
                let _ = self.events.send(SessionEvent::Notification { name, body });
            }
            Err(e) => warn!(error = %e, "dropping malformed upstream frame"),
        }
    }

    fn fail_pending(&mut self) {
        for call in self.pending.drain(..) {
            let _ = call.reply.send(Err(SessionError::ConnectionLost));
        }
    }

    fn next_call_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }
}
