//! Realtime connection manager.
//!
//! Owns exactly one socket at a time. `connect` spawns a driver task that
//! opens the socket, restores recorded subscriptions, runs the message loop
//! with heartbeats, and reconnects with exponential backoff after any close
//! that was not requested through `disconnect`.

use crate::envelope::{Envelope, InboundKind};
use crate::error::{RealtimeError, RealtimeResult};
use crate::event::ClientEvent;
use crate::event_bus::EventBus;
use crate::heartbeat::{HeartbeatManager, HeartbeatStats};
use crate::reconnect::{ReconnectController, ReconnectPolicy};
use crate::send_handle::SendHandle;
use crate::stats::{ClientStats, StatsSnapshot};
use crate::subscription::{SubscriptionRegistry, Subscriptions};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Longest frame prefix included in drop logs.
const LOGGED_FRAME_CHARS: usize = 200;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum consecutive reconnection attempts (0 = unbounded).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Backoff ceiling (0 = uncapped).
    pub reconnect_max_delay_ms: u64,
    /// Heartbeat send interval.
    pub heartbeat_interval_ms: u64,
    /// Silence after a heartbeat before the session is dropped (0 = never).
    pub heartbeat_timeout_ms: u64,
    /// Bound on a single open attempt (0 = unbounded).
    pub connect_timeout_ms: u64,
    /// Outbound queue capacity.
    pub outbound_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 0,
            connect_timeout_ms: 10_000,
            outbound_buffer: 256,
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: self.reconnect_base_delay_ms,
            max_delay_ms: self.reconnect_max_delay_ms,
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnection bound exhausted. Only a manual `connect` leaves this state.
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session ended.
#[derive(Debug)]
enum SessionClose {
    /// Requested through `disconnect`.
    Clean,
    Unclean { code: Option<u16>, reason: String },
}

impl SessionClose {
    fn unclean(reason: impl std::fmt::Display) -> Self {
        Self::Unclean {
            code: None,
            reason: reason.to_string(),
        }
    }
}

struct Session {
    token: CancellationToken,
    /// Cancelled by the driver task when it exits.
    done: CancellationToken,
    task: JoinHandle<()>,
}

/// State shared between the manager and its driver task.
struct Shared {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    bus: Arc<EventBus>,
    heartbeat: HeartbeatManager,
    registry: Arc<SubscriptionRegistry>,
    stats: Arc<ClientStats>,
    reconnect_attempts: AtomicU32,
    outbound_rx: TokioMutex<mpsc::Receiver<String>>,
}

/// Realtime connection manager.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    sender: SendHandle,
    session: Mutex<Option<Session>>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, bus: Arc<EventBus>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let stats = Arc::new(ClientStats::new());
        let sender = SendHandle::new(outbound_tx, state.clone(), stats.clone());

        Self {
            shared: Arc::new(Shared {
                heartbeat: HeartbeatManager::new(
                    config.heartbeat_interval_ms,
                    config.heartbeat_timeout_ms,
                ),
                config,
                state,
                bus,
                registry: Arc::new(SubscriptionRegistry::new()),
                stats,
                reconnect_attempts: AtomicU32::new(0),
                outbound_rx: TokioMutex::new(outbound_rx),
            }),
            sender,
            session: Mutex::new(None),
        }
    }

    /// Start a session against `url`.
    ///
    /// Returns before the socket is open. No-op (returns false) while a
    /// session is connecting, connected or reconnecting. Must be called from
    /// within a Tokio runtime.
    pub fn connect(&self, url: &str) -> bool {
        let mut session = self.session.lock();

        if let Some(current) = session.as_ref() {
            let live = !current.token.is_cancelled()
                && !current.task.is_finished()
                && self.state() != ConnectionState::Failed;
            if live {
                debug!(state = %self.state(), "Session already active, ignoring connect");
                return false;
            }
        }

        let previous = session.take();
        let token = CancellationToken::new();
        let done = CancellationToken::new();

        let shared = self.shared.clone();
        let url = url.to_string();
        let task_token = token.clone();
        let task_done = done.clone();
        let task = tokio::spawn(async move {
            let _done = task_done.drop_guard();
            if let Some(prev) = previous {
                prev.token.cancel();
                if let Err(e) = prev.task.await {
                    warn!(?e, "Previous session task ended abnormally");
                }
            }
            shared.run(url, task_token).await;
        });

        *session = Some(Session { token, done, task });
        true
    }

    /// Close the socket cleanly. Clean closes never trigger reconnection.
    ///
    /// Returns false if there was no session to close.
    pub fn disconnect(&self) -> bool {
        let session = self.session.lock();
        let Some(current) = session.as_ref() else {
            return false;
        };
        if current.token.is_cancelled() {
            return false;
        }

        info!("Disconnect requested");
        // Mark clean before the driver can observe the close.
        let mut state = self.shared.state.write();
        current.token.cancel();
        *state = ConnectionState::Disconnected;
        true
    }

    /// Wait until the current session's driver task has exited.
    pub async fn closed(&self) {
        let done = self.session.lock().as_ref().map(|s| s.done.clone());
        if let Some(done) = done {
            done.cancelled().await;
        }
    }

    /// Queue an envelope (at-most-once, never blocks).
    pub fn send(&self, envelope: &Envelope) -> bool {
        self.sender.send(envelope)
    }

    pub fn sender(&self) -> SendHandle {
        self.sender.clone()
    }

    /// Subscription façade bound to this connection.
    pub fn subscriptions(&self) -> Subscriptions {
        Subscriptions::new(self.sender.clone(), self.shared.registry.clone())
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.shared.registry
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reconnection attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot(self.shared.bus.failure_count())
    }

    pub fn heartbeat_stats(&self) -> HeartbeatStats {
        self.shared.heartbeat.stats()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().as_ref() {
            session.token.cancel();
        }
    }
}

impl Shared {
    /// Write the state unless the session has been cancelled.
    fn set_state(&self, token: &CancellationToken, new: ConnectionState) -> bool {
        let mut state = self.state.write();
        if token.is_cancelled() {
            return false;
        }
        *state = new;
        true
    }

    async fn run(&self, url: String, token: CancellationToken) {
        let mut controller = ReconnectController::new(self.config.reconnect_policy());

        loop {
            if !self.set_state(&token, ConnectionState::Connecting) {
                return;
            }
            info!(url = %url, "Connecting to realtime server");

            let opened = tokio::select! {
                biased;
                () = token.cancelled() => {
                    info!("Disconnect requested while connecting");
                    self.emit_clean_close();
                    return;
                }
                result = self.open(&url) => result,
            };

            match opened {
                Ok(ws) => {
                    let recovered = controller.on_connected();
                    self.reconnect_attempts.store(0, Ordering::Relaxed);

                    match self.run_session(ws, &url, recovered, &token).await {
                        SessionClose::Clean => {
                            self.emit_clean_close();
                            return;
                        }
                        SessionClose::Unclean { code, reason } => {
                            warn!(?code, %reason, "Realtime connection lost");
                            self.set_state(&token, ConnectionState::Disconnected);
                            self.bus.emit(&ClientEvent::Disconnected {
                                code,
                                reason,
                                clean: false,
                            });
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Realtime connect failed");
                    self.bus.emit(&ClientEvent::Error {
                        message: e.to_string(),
                    });
                }
            }

            if token.is_cancelled() {
                self.emit_clean_close();
                return;
            }

            let Some((attempt, delay)) = controller.next_attempt() else {
                let attempts = controller.attempts();
                error!(attempts, "Max reconnection attempts reached");
                self.set_state(&token, ConnectionState::Failed);
                self.bus
                    .emit(&ClientEvent::MaxReconnectAttemptsReached { attempts });
                return;
            };

            self.reconnect_attempts.store(attempt, Ordering::Relaxed);
            self.stats.reconnect_attempt();
            self.set_state(&token, ConnectionState::Reconnecting);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            self.bus.emit(&ClientEvent::Reconnecting { attempt, delay });

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = token.cancelled() => {
                    info!("Disconnect requested during backoff");
                    self.emit_clean_close();
                    return;
                }
            }
        }
    }

    async fn open(&self, url: &str) -> RealtimeResult<WsStream> {
        let connect = connect_async_tls_with_config(url, None, true, None);
        let timeout_ms = self.config.connect_timeout_ms;
        if timeout_ms == 0 {
            return Ok(connect.await?.0);
        }
        match tokio::time::timeout(Duration::from_millis(timeout_ms), connect).await {
            Ok(result) => Ok(result?.0),
            Err(_) => Err(RealtimeError::ConnectTimeout(timeout_ms)),
        }
    }

    async fn run_session(
        &self,
        ws: WsStream,
        url: &str,
        recovered: Option<u32>,
        token: &CancellationToken,
    ) -> SessionClose {
        let (mut write, mut read) = ws.split();

        let mut outbound = self.outbound_rx.lock().await;
        let mut stale = 0usize;
        while outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale, "Discarded outbound frames queued for a previous connection");
        }

        self.heartbeat.reset();
        if !self.set_state(token, ConnectionState::Connected) {
            return SessionClose::Clean;
        }
        info!(url = %url, "Realtime connected");
        self.bus.emit(&ClientEvent::Connected {
            url: url.to_string(),
        });
        if let Some(attempts) = recovered {
            info!(attempts, "Realtime connection recovered");
            self.bus.emit(&ClientEvent::Reconnected { attempts });
        }

        let restore = self.registry.restore_envelopes();
        if !restore.is_empty() {
            info!(count = restore.len(), "Restoring subscriptions");
        }
        for envelope in restore {
            match envelope.encode() {
                Ok(text) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return SessionClose::unclean(e);
                    }
                    self.stats.envelope_sent();
                }
                Err(e) => warn!(error = %e, "Failed to encode subscription"),
            }
        }

        let mut ticker = self.heartbeat.ticker();

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    info!("Closing realtime socket");
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "Client disconnect".into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        debug!(?e, "Failed to send close frame");
                    }
                    return SessionClose::Clean;
                }

                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            dispatch_frame(&text, &self.bus, &self.heartbeat, &self.stats);
                        }
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                dispatch_frame(&text, &self.bus, &self.heartbeat, &self.stats);
                            }
                            Err(_) => {
                                self.stats.frame_received();
                                self.stats.frame_undecodable();
                                warn!("Dropping non-UTF-8 binary frame");
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_message();
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return SessionClose::unclean(e);
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_message();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            if token.is_cancelled() {
                                return SessionClose::Clean;
                            }
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((1005, "No close frame".to_string()));
                            return SessionClose::Unclean { code: Some(code), reason };
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return SessionClose::unclean(e);
                        }
                        None => {
                            return SessionClose::Unclean {
                                code: Some(1006),
                                reason: "Stream ended".to_string(),
                            };
                        }
                    }
                }

                Some(text) = outbound.recv() => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return SessionClose::unclean(e);
                    }
                    self.stats.envelope_sent();
                }

                _ = ticker.tick() => {
                    if self.heartbeat.is_timed_out() {
                        return SessionClose::unclean(RealtimeError::HeartbeatTimeout);
                    }
                    if *self.state.read() != ConnectionState::Connected {
                        continue;
                    }
                    let heartbeat = self.heartbeat.next_heartbeat();
                    match heartbeat.encode() {
                        Ok(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                return SessionClose::unclean(e);
                            }
                            self.stats.heartbeat_sent();
                        }
                        Err(e) => warn!(error = %e, "Failed to encode heartbeat"),
                    }
                }
            }
        }
    }

    fn emit_clean_close(&self) {
        self.bus.emit(&ClientEvent::Disconnected {
            code: Some(1000),
            reason: "Client disconnect".to_string(),
            clean: true,
        });
    }
}

/// Decode one inbound text frame and dispatch it to the bus.
///
/// Undecodable frames and unknown types are logged and dropped; nothing is
/// emitted for them. Returns the dispatched kind.
pub(crate) fn dispatch_frame(
    text: &str,
    bus: &EventBus,
    heartbeat: &HeartbeatManager,
    stats: &ClientStats,
) -> Option<InboundKind> {
    stats.frame_received();
    heartbeat.record_message();

    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            stats.frame_undecodable();
            let prefix: String = text.chars().take(LOGGED_FRAME_CHARS).collect();
            warn!(error = %e, frame = %prefix, "Dropping undecodable frame");
            return None;
        }
    };

    let Some(kind) = envelope.inbound_kind() else {
        stats.frame_unknown_type();
        warn!(kind = %envelope.kind, "Dropping frame with unknown type");
        return None;
    };

    if kind == InboundKind::Heartbeat {
        heartbeat.record_ack();
    }

    trace!(%kind, "Dispatching inbound envelope");
    bus.emit(&ClientEvent::Message(envelope.clone()));
    bus.emit(&ClientEvent::Inbound { kind, envelope });
    Some(kind)
}
