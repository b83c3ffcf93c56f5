//! One persistent RPC channel to a beacon.
//!
//! A [`BeaconChannel`] owns a single WebSocket connection to one endpoint
//! and multiplexes every concurrent call over it. A driver task holds the
//! transport and the correlator exclusively and runs the whole lifecycle:
//! connect on first use, flush and correlate requests, heartbeat, reconnect
//! with jittered backoff, and teardown.
//!
//! Calls issued while the channel is not connected queue with their deadline
//! running and are flushed on (re)connect; still-pending frames are
//! retransmitted after a reconnect, so a short outage is invisible to
//! callers whose deadlines outlive it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use beacon_proto::{
    Achievement, BeaconRequest, BeaconResponse, BeaconStatus, CallResult, LogPage, LogQuery,
    PlayerIdentity, PlayerQuery, PlayerState, PlayerStats, ProtoError, RequestFrame,
    RescanStarted, ResponseFrame, ServerId, SessionPage, codes,
};
use chrono::{DateTime, Utc};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::correlator::{CallReply, Correlator, PendingCall};
use crate::error::BeaconError;
use crate::state::{AtomicConnectionState, ConnectionState};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// How often queued deadlines are checked.
const SWEEP_INTERVAL: Duration = Duration::from_millis(25);

/// Commands from channel handles to the driver task.
enum Command {
    /// Issue one request and deliver its result to `reply`.
    Call {
        request: BeaconRequest,
        deadline: Instant,
        timeout: Duration,
        reply: oneshot::Sender<CallReply>,
    },
    /// Wake the driver out of `Idle` without issuing a request.
    Connect,
    /// Tear the channel down; `done` fires when teardown is complete.
    Close { done: oneshot::Sender<()> },
}

#[derive(Debug, Default)]
struct StatsInner {
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    pending_calls: AtomicUsize,
}

/// Point-in-time health snapshot of one channel.
///
/// Observability only; none of these fields affect call semantics.
#[derive(Debug, Clone)]
pub struct ChannelStats {
    /// When the current or most recent connection was established.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// When the most recent connection error happened.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Description of the most recent connection error.
    pub last_error: Option<String>,
    /// Consecutive failed connect attempts so far (0 while connected).
    pub reconnect_attempts: u32,
    /// Calls currently in flight, heartbeat probes included.
    pub pending_calls: usize,
}

/// A pooled, reconnecting RPC channel to one beacon.
///
/// Cheap to share: handles are cloned out of the pool as `Arc`s, and every
/// method takes `&self`. All state lives with the driver task.
pub struct BeaconChannel {
    server_id: ServerId,
    default_timeout: Duration,
    state: Arc<AtomicConnectionState>,
    stats: Arc<StatsInner>,
    cmd_tx: mpsc::Sender<Command>,
}

impl BeaconChannel {
    /// Create a channel for one endpoint and spawn its driver task.
    ///
    /// The channel starts in [`ConnectionState::Idle`] and dials lazily on
    /// the first call (or [`ensure_connected`](Self::ensure_connected)).
    #[must_use]
    pub fn new(config: EndpointConfig) -> Self {
        let state = Arc::new(AtomicConnectionState::new(ConnectionState::Idle));
        let stats = Arc::new(StatsInner::default());
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let driver = Driver {
            server_id: config.server_id.clone(),
            config,
            state: Arc::clone(&state),
            stats: Arc::clone(&stats),
            cmd_rx,
            correlator: Correlator::new(),
            missed_acks: 0,
        };
        let server_id = driver.server_id.clone();
        let default_timeout = driver.config.default_timeout;
        tokio::spawn(driver.run());

        Self {
            server_id,
            default_timeout,
            state,
            stats,
            cmd_tx,
        }
    }

    /// The endpoint this channel talks to.
    #[must_use]
    pub const fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    /// Whether the channel is terminally closed or failed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.load().is_terminal()
    }

    /// Health snapshot.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            last_connected_at: *self.stats.last_connected_at.read(),
            last_error_at: *self.stats.last_error_at.read(),
            last_error: self.stats.last_error.read().clone(),
            reconnect_attempts: self.stats.reconnect_attempts.load(Ordering::SeqCst),
            pending_calls: self.stats.pending_calls.load(Ordering::SeqCst),
        }
    }

    /// Kick an idle channel into connecting without issuing a request.
    ///
    /// Returns as soon as the driver has been woken; it does not wait for
    /// the connection to be established.
    ///
    /// # Errors
    ///
    /// Returns `Closed` (or `Network` for a failed channel) if the channel
    /// is terminal.
    pub async fn ensure_connected(&self) -> Result<(), BeaconError> {
        if let Some(err) = self.terminal_error() {
            return Err(err);
        }
        self.cmd_tx
            .send(Command::Connect)
            .await
            .map_err(|_| BeaconError::Closed)
    }

    /// Call one event on the beacon with the endpoint's default timeout.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications; see the crate
    /// docs for how callers are expected to map them.
    pub async fn call(&self, request: BeaconRequest) -> Result<BeaconResponse, BeaconError> {
        self.call_with_timeout(request, self.default_timeout).await
    }

    /// Call one event with an explicit timeout.
    ///
    /// The deadline starts now: time spent queued while the channel is
    /// connecting or reconnecting counts against it.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn call_with_timeout(
        &self,
        request: BeaconRequest,
        timeout: Duration,
    ) -> Result<BeaconResponse, BeaconError> {
        self.submit(request, Instant::now() + timeout, timeout).await
    }

    /// Call one event with an explicit absolute deadline.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn call_with_deadline(
        &self,
        request: BeaconRequest,
        deadline: Instant,
    ) -> Result<BeaconResponse, BeaconError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        self.submit(request, deadline, timeout).await
    }

    /// Tear the channel down: close the transport and fail every pending
    /// call with `Closed`.
    ///
    /// Idempotent; returns once teardown is complete. Called by the pool on
    /// administrative disable/delete.
    pub async fn close(&self) {
        let (done, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close { done }).await.is_ok() {
            let _ = rx.await;
        }
        // A send failure means the driver is already gone.
    }

    // ==================== Typed convenience calls ====================

    /// Heartbeat-style probe.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn ping(&self) -> Result<(), BeaconError> {
        match self.call(BeaconRequest::Ping).await? {
            BeaconResponse::Pong => Ok(()),
            other => Err(unexpected("pong", &other)),
        }
    }

    /// Status query: counters and timing.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn status(&self) -> Result<BeaconStatus, BeaconError> {
        match self.call(BeaconRequest::GetStatus).await? {
            BeaconResponse::Status(status) => Ok(status),
            other => Err(unexpected("status", &other)),
        }
    }

    /// Paginated, filtered log fetch.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn logs(&self, query: LogQuery) -> Result<LogPage, BeaconError> {
        match self.call(BeaconRequest::GetLogs(query)).await? {
            BeaconResponse::Logs(page) => Ok(page),
            other => Err(unexpected("logs", &other)),
        }
    }

    /// Player-identity lookup.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn find_player(&self, query: PlayerQuery) -> Result<PlayerIdentity, BeaconError> {
        match self.call(BeaconRequest::FindPlayer(query)).await? {
            BeaconResponse::Player(player) => Ok(player),
            other => Err(unexpected("player", &other)),
        }
    }

    /// Aggregate statistics for one player.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn player_stats(
        &self,
        player_id: impl Into<String>,
    ) -> Result<PlayerStats, BeaconError> {
        let request = BeaconRequest::GetPlayerStats {
            player_id: player_id.into(),
        };
        match self.call(request).await? {
            BeaconResponse::PlayerStats(stats) => Ok(stats),
            other => Err(unexpected("player_stats", &other)),
        }
    }

    /// Earned achievements for one player.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn player_achievements(
        &self,
        player_id: impl Into<String>,
    ) -> Result<Vec<Achievement>, BeaconError> {
        let request = BeaconRequest::GetPlayerAchievements {
            player_id: player_id.into(),
        };
        match self.call(request).await? {
            BeaconResponse::PlayerAchievements(achievements) => Ok(achievements),
            other => Err(unexpected("player_achievements", &other)),
        }
    }

    /// Paginated session history for one player.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn player_sessions(
        &self,
        player_id: impl Into<String>,
        page: u32,
        page_size: u32,
    ) -> Result<SessionPage, BeaconError> {
        let request = BeaconRequest::GetPlayerSessions {
            player_id: player_id.into(),
            page,
            page_size,
        };
        match self.call(request).await? {
            BeaconResponse::PlayerSessions(sessions) => Ok(sessions),
            other => Err(unexpected("player_sessions", &other)),
        }
    }

    /// Raw per-player state document.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn player_state(
        &self,
        player_id: impl Into<String>,
    ) -> Result<PlayerState, BeaconError> {
        let request = BeaconRequest::GetPlayerState {
            player_id: player_id.into(),
        };
        match self.call(request).await? {
            BeaconResponse::PlayerState(state) => Ok(state),
            other => Err(unexpected("player_state", &other)),
        }
    }

    /// Force a full rescan of the game server's data.
    ///
    /// # Errors
    ///
    /// Fails with one of the [`BeaconError`] classifications.
    pub async fn rescan(&self) -> Result<RescanStarted, BeaconError> {
        match self.call(BeaconRequest::Rescan).await? {
            BeaconResponse::RescanStarted(info) => Ok(info),
            other => Err(unexpected("rescan_started", &other)),
        }
    }

    async fn submit(
        &self,
        request: BeaconRequest,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<BeaconResponse, BeaconError> {
        if let Some(err) = self.terminal_error() {
            return Err(err);
        }

        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Call {
                request,
                deadline,
                timeout,
                reply,
            })
            .await
            .map_err(|_| BeaconError::Closed)?;

        match rx.await {
            Ok(result) => result,
            // The driver dropped the reply without resolving: teardown race.
            Err(_) => Err(BeaconError::Closed),
        }
    }

    fn terminal_error(&self) -> Option<BeaconError> {
        match self.state.load() {
            ConnectionState::Closed => Some(BeaconError::Closed),
            ConnectionState::Failed => Some(BeaconError::Network(
                "beacon unreachable: channel failed".to_string(),
            )),
            _ => None,
        }
    }
}

fn unexpected(expected: &'static str, got: &BeaconResponse) -> BeaconError {
    BeaconError::Protocol(ProtoError::UnexpectedEvent {
        expected,
        got: got.event_name(),
    })
}

/// Outcome of one dial attempt.
enum DialOutcome {
    Connected(Box<WsStream>),
    Error(String),
    Close(oneshot::Sender<()>),
    HandlesDropped,
}

/// Why an established connection ended.
enum Session {
    Lost(String),
    Close(oneshot::Sender<()>),
    HandlesDropped,
}

/// Outcome of a responsive wait.
enum Flow {
    Continue,
    Close(oneshot::Sender<()>),
    HandlesDropped,
}

/// The driver task: exclusive owner of the transport and the correlator.
struct Driver {
    server_id: ServerId,
    config: EndpointConfig,
    state: Arc<AtomicConnectionState>,
    stats: Arc<StatsInner>,
    cmd_rx: mpsc::Receiver<Command>,
    correlator: Correlator,
    missed_acks: u32,
}

impl Driver {
    async fn run(mut self) {
        // Idle until something needs the connection.
        match self.cmd_rx.recv().await {
            None => return self.shutdown(None),
            Some(Command::Close { done }) => return self.shutdown(Some(done)),
            Some(Command::Connect) => {}
            Some(Command::Call {
                request,
                deadline,
                timeout,
                reply,
            }) => {
                let _ = self.register_call(request, deadline, timeout, reply);
            }
        }

        let mut attempt: u32 = 0;
        loop {
            self.state.store(ConnectionState::Connecting);
            match self.dial().await {
                DialOutcome::Close(done) => return self.shutdown(Some(done)),
                DialOutcome::HandlesDropped => return self.shutdown(None),
                DialOutcome::Connected(ws) => {
                    attempt = 0;
                    self.on_connected();
                    let (mut sink, stream) = (*ws).split();
                    let session = match self.flush_pending(&mut sink).await {
                        Ok(()) => self.run_connection(&mut sink, stream).await,
                        Err(reason) => Session::Lost(reason),
                    };
                    match session {
                        Session::Close(done) => return self.shutdown(Some(done)),
                        Session::HandlesDropped => return self.shutdown(None),
                        Session::Lost(reason) => self.record_error(&reason),
                    }
                }
                DialOutcome::Error(reason) => self.record_error(&reason),
            }

            // Pending calls survive the outage; only their own deadlines or
            // teardown fail them. Back off before the next dial.
            attempt += 1;
            self.stats.reconnect_attempts.store(attempt, Ordering::SeqCst);
            if !self.config.reconnect.should_reconnect(attempt) {
                return self.give_up(attempt).await;
            }
            self.state.store(ConnectionState::Reconnecting);
            let delay = self.config.reconnect.jittered_delay(attempt);
            debug!(server = %self.server_id, attempt, ?delay, "backing off before reconnect");
            match self.idle_wait(delay).await {
                Flow::Continue => {}
                Flow::Close(done) => return self.shutdown(Some(done)),
                Flow::HandlesDropped => return self.shutdown(None),
            }
        }
    }

    /// Dial the endpoint while staying responsive to commands and deadlines.
    async fn dial(&mut self) -> DialOutcome {
        info!(server = %self.server_id, url = %self.config.url, "connecting to beacon");
        let connect = tokio_tungstenite::connect_async(self.config.url.clone());
        tokio::pin!(connect);
        let mut sweep = interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok((ws, _)) => DialOutcome::Connected(Box::new(ws)),
                        Err(e) => DialOutcome::Error(format!("connect failed: {e}")),
                    };
                }
                _ = sweep.tick() => self.sweep_deadlines(),
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return DialOutcome::HandlesDropped,
                    Some(Command::Close { done }) => return DialOutcome::Close(done),
                    Some(Command::Connect) => {}
                    Some(Command::Call { request, deadline, timeout, reply }) => {
                        // Queue-with-deadline: registered now, sent on connect.
                        let _ = self.register_call(request, deadline, timeout, reply);
                    }
                },
            }
        }
    }

    /// Serve one established connection until it ends.
    async fn run_connection(&mut self, sink: &mut WsSink, mut stream: WsSource) -> Session {
        let mut heartbeat = interval(self.config.heartbeat.interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                    Some(Ok(Message::Close(_))) => {
                        return Session::Lost("beacon closed the connection".to_string());
                    }
                    Some(Ok(_)) => {} // Binary/Ping/Pong frames are not part of the protocol
                    Some(Err(e)) => return Session::Lost(format!("transport error: {e}")),
                    None => return Session::Lost("connection closed".to_string()),
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return Session::HandlesDropped,
                    Some(Command::Close { done }) => return Session::Close(done),
                    Some(Command::Connect) => {}
                    Some(Command::Call { request, deadline, timeout, reply }) => {
                        if let Some((id, json)) = self.register_call(request, deadline, timeout, reply) {
                            if let Err(e) = sink.send(Message::Text(json)).await {
                                // The call stays pending: it is retransmitted on
                                // reconnect or expired by its own deadline.
                                return Session::Lost(format!("write failed: {e}"));
                            }
                            debug!(server = %self.server_id, id = %id, "request sent");
                        }
                    }
                },
                _ = heartbeat.tick() => {
                    if self.missed_acks >= self.config.heartbeat.max_missed_acks {
                        return Session::Lost("heartbeat acks missed".to_string());
                    }
                    if let Err(e) = self.send_ping(sink).await {
                        return Session::Lost(format!("heartbeat write failed: {e}"));
                    }
                }
                _ = sweep.tick() => self.sweep_deadlines(),
            }
        }
    }

    /// Wait out a backoff delay while staying responsive.
    async fn idle_wait(&mut self, delay: Duration) -> Flow {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        let mut sweep = interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = &mut sleep => return Flow::Continue,
                _ = sweep.tick() => self.sweep_deadlines(),
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return Flow::HandlesDropped,
                    Some(Command::Close { done }) => return Flow::Close(done),
                    Some(Command::Connect) => {}
                    Some(Command::Call { request, deadline, timeout, reply }) => {
                        let _ = self.register_call(request, deadline, timeout, reply);
                    }
                },
            }
        }
    }

    /// Allocate an id, serialize the frame, and register the pending call.
    ///
    /// Returns the id and serialized frame if the call should be sent now;
    /// `None` means it was already resolved (encode failure).
    fn register_call(
        &mut self,
        request: BeaconRequest,
        deadline: Instant,
        timeout: Duration,
        reply: oneshot::Sender<CallReply>,
    ) -> Option<(beacon_proto::CorrelationId, String)> {
        let id = self.correlator.next();
        let event = request.event_name();
        let frame = RequestFrame::new(id, self.config.auth_key.clone(), request);
        match frame.to_json() {
            Ok(json) => {
                self.correlator.register(
                    id,
                    PendingCall {
                        event,
                        deadline,
                        timeout,
                        frame: json.clone(),
                        reply,
                    },
                );
                self.update_pending_gauge();
                Some((id, json))
            }
            Err(e) => {
                let _ = reply.send(Err(BeaconError::Protocol(e)));
                None
            }
        }
    }

    /// Send every still-pending frame, in id order.
    ///
    /// Runs right after (re)connect: queued calls go out for the first time
    /// and already-sent unanswered calls are retransmitted. Beacons dedupe
    /// by correlation id, so retransmission is safe.
    async fn flush_pending(&mut self, sink: &mut WsSink) -> Result<(), String> {
        for (id, json) in self.correlator.pending_frames() {
            sink.send(Message::Text(json))
                .await
                .map_err(|e| format!("write failed: {e}"))?;
            debug!(server = %self.server_id, id = %id, "pending request flushed");
        }
        Ok(())
    }

    /// Correlate one inbound frame to its waiter.
    fn handle_frame(&mut self, text: &str) {
        match ResponseFrame::from_json(text) {
            Ok(frame) => {
                let reply: CallReply = match frame.result {
                    CallResult::Ok { response } => {
                        if matches!(response, BeaconResponse::Pong) {
                            self.missed_acks = 0;
                        }
                        Ok(response)
                    }
                    CallResult::Error { code, message } => {
                        if code == codes::AUTH_REJECTED {
                            Err(BeaconError::Auth(message))
                        } else {
                            Err(BeaconError::Application { code, message })
                        }
                    }
                };
                if !self.correlator.resolve(frame.id, reply) {
                    // Stale response to a timed-out or abandoned call.
                    debug!(
                        server = %self.server_id,
                        id = %frame.id,
                        "dropping response with unknown correlation id"
                    );
                }
                self.update_pending_gauge();
            }
            Err(e) => {
                warn!(server = %self.server_id, "unparseable beacon frame: {e}");
            }
        }
    }

    /// Register and send one heartbeat probe.
    ///
    /// Probes ride the normal correlation path with `ack_timeout` as their
    /// deadline; nobody awaits them — the missed-ack counter, reset by any
    /// pong, is what detects a dead connection.
    async fn send_ping(&mut self, sink: &mut WsSink) -> Result<(), WsError> {
        let id = self.correlator.next();
        let frame = RequestFrame::new(id, self.config.auth_key.clone(), BeaconRequest::Ping);
        let json = match frame.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(server = %self.server_id, "failed to encode heartbeat: {e}");
                return Ok(());
            }
        };

        let (reply, _ignored) = oneshot::channel();
        self.correlator.register(
            id,
            PendingCall {
                event: "ping",
                deadline: Instant::now() + self.config.heartbeat.ack_timeout,
                timeout: self.config.heartbeat.ack_timeout,
                frame: json.clone(),
                reply,
            },
        );
        self.missed_acks += 1;
        self.update_pending_gauge();
        sink.send(Message::Text(json)).await
    }

    fn sweep_deadlines(&mut self) {
        let expired = self.correlator.expire_due(Instant::now());
        if expired > 0 {
            debug!(server = %self.server_id, expired, "expired pending calls");
            self.update_pending_gauge();
        }
    }

    fn on_connected(&mut self) {
        self.state.store(ConnectionState::Connected);
        self.missed_acks = 0;
        self.stats.reconnect_attempts.store(0, Ordering::SeqCst);
        *self.stats.last_connected_at.write() = Some(Utc::now());
        info!(server = %self.server_id, "connected to beacon");
    }

    fn record_error(&self, reason: &str) {
        *self.stats.last_error_at.write() = Some(Utc::now());
        *self.stats.last_error.write() = Some(reason.to_string());
        warn!(server = %self.server_id, "beacon connection lost: {reason}");
    }

    /// Terminal failure: stop reconnecting, fail everything fast.
    async fn give_up(mut self, attempts: u32) {
        warn!(
            server = %self.server_id,
            attempts, "giving up on beacon after repeated connect failures"
        );
        self.state.store(ConnectionState::Failed);
        self.correlator.fail_all(|_| {
            BeaconError::Network("beacon unreachable: gave up reconnecting".to_string())
        });
        self.update_pending_gauge();

        // Park: fail later calls immediately instead of queueing forever.
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::Call { reply, .. } => {
                    let _ = reply.send(Err(BeaconError::Network(
                        "beacon unreachable: channel failed".to_string(),
                    )));
                }
                Command::Connect => {}
                Command::Close { done } => {
                    let _ = done.send(());
                    return;
                }
            }
        }
    }

    /// Administrative teardown: fail every pending and queued call `Closed`.
    fn shutdown(mut self, done: Option<oneshot::Sender<()>>) {
        self.state.store(ConnectionState::Closed);
        let failed = self.correlator.fail_all(|_| BeaconError::Closed);
        if failed > 0 {
            debug!(server = %self.server_id, failed, "failed pending calls on teardown");
        }
        self.update_pending_gauge();

        // Commands already in the buffer get the same answer.
        self.cmd_rx.close();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                Command::Call { reply, .. } => {
                    let _ = reply.send(Err(BeaconError::Closed));
                }
                Command::Close { done } => {
                    let _ = done.send(());
                }
                Command::Connect => {}
            }
        }

        info!(server = %self.server_id, "channel closed");
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn update_pending_gauge(&self) {
        self.stats
            .pending_calls
            .store(self.correlator.len(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EndpointConfig {
        EndpointConfig::new(
            ServerId::new("srv-test").unwrap(),
            "ws://127.0.0.1:1",
            "secret",
        )
    }

    #[tokio::test]
    async fn test_new_channel_is_idle() {
        let channel = BeaconChannel::new(config());
        assert_eq!(channel.state(), ConnectionState::Idle);
        assert!(!channel.is_terminal());

        let stats = channel.stats();
        assert_eq!(stats.pending_calls, 0);
        assert_eq!(stats.reconnect_attempts, 0);
        assert!(stats.last_connected_at.is_none());
    }

    #[tokio::test]
    async fn test_close_is_terminal_and_idempotent() {
        let channel = BeaconChannel::new(config());
        channel.close().await;
        assert_eq!(channel.state(), ConnectionState::Closed);

        // Second close is a no-op.
        channel.close().await;
        assert_eq!(channel.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_call_after_close_fails_closed() {
        let channel = BeaconChannel::new(config());
        channel.close().await;

        let result = channel.call(BeaconRequest::GetStatus).await;
        assert!(matches!(result, Err(BeaconError::Closed)));
    }

    #[tokio::test]
    async fn test_ensure_connected_after_close_fails() {
        let channel = BeaconChannel::new(config());
        channel.close().await;
        assert!(matches!(
            channel.ensure_connected().await,
            Err(BeaconError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_server_id_accessor() {
        let channel = BeaconChannel::new(config());
        assert_eq!(channel.server_id().as_str(), "srv-test");
        channel.close().await;
    }
}
