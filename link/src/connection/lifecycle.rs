//! Socket lifecycle manager.
//!
//! One background task owns the shared socket, the subscription table and
//! every timer. The public API talks to it over an unbounded command
//! channel, so `subscribe` never waits on the network. The task:
//!
//! - opens the socket lazily on the first subscription (handshake, connect,
//!   `connection_init`, wait for `connection_ack`)
//! - sends `start` for every subscription not yet started on the current socket
//! - refreshes a liveness deadline on every inbound message and treats its
//!   expiry like an unexpected close
//! - reconnects with bounded, jittered exponential backoff, parked while
//!   the network is offline
//! - closes the socket when the last subscription detaches
//!
//! Every deadline lives in a plain `Option<Instant>` that is recomputed on
//! each loop iteration, so clearing it on a state change is all it takes
//! to cancel the timer.

use super::backoff::{backoff_delay, jitter_seed, ReconnectState};
use super::transport::{Connector, Transport, TransportFrame};
use super::{now_ms, FAR_FUTURE};
use crate::connection_status::ConnectionStatusMonitor;
use crate::context::{run_non_terminating, OperationContext, HANDSHAKE_KEY};
use crate::error::{LinkError, Result};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::handshake::HandshakeCoordinator;
use crate::models::{
    ClientMessage, ConnectionOptions, HandshakeInfo, IntendedState, ServerMessage, SocketPhase,
    SocketState, SubscriptionInfo, SubscriptionRequest,
};
use crate::reachability::{ReachabilityMonitor, ReachabilitySubscription};
use crate::subscription::multiplexer::{Delivery, Routed, SubscriptionMultiplexer};
use crate::timeouts::LinkTimeouts;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the lifecycle task.
pub(crate) enum LinkCmd {
    Subscribe {
        key: u64,
        request: SubscriptionRequest,
        delivery_tx: mpsc::UnboundedSender<Delivery>,
    },
    Unsubscribe {
        key: u64,
    },
    ListSubscriptions {
        result_tx: oneshot::Sender<Vec<SubscriptionInfo>>,
    },
    SocketState {
        result_tx: oneshot::Sender<SocketState>,
    },
    Disconnect {
        done_tx: oneshot::Sender<()>,
    },
}

/// Everything the lifecycle task needs, assembled by the client builder.
pub(crate) struct LinkConfig {
    pub coordinator: HandshakeCoordinator,
    pub connector: Arc<dyn Connector>,
    pub status: ConnectionStatusMonitor,
    pub handlers: EventHandlers,
    pub timeouts: LinkTimeouts,
    pub options: ConnectionOptions,
}

// ── Handle ──────────────────────────────────────────────────────────────────

pub(crate) struct LifecycleHandle {
    cmd_tx: mpsc::UnboundedSender<LinkCmd>,
    _task: JoinHandle<()>,
}

impl LifecycleHandle {
    /// Spawn the lifecycle task on `runtime`.
    ///
    /// The task runs until [`LinkCmd::Disconnect`] or until every command
    /// sender (the client and all subscription handles) is gone.
    pub fn spawn(
        config: LinkConfig,
        reachability: &ReachabilityMonitor,
        runtime: &tokio::runtime::Handle,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (net_tx, net_rx) = mpsc::unbounded_channel();

        let online = reachability.last_known().map_or(true, |s| s.online);
        let net_subscription = reachability.subscribe(move |status| {
            let _ = net_tx.send(status.online);
        });

        let task = LinkTask::new(config, cmd_rx, net_rx, net_subscription, online);
        let task = runtime.spawn(task.run());

        Self {
            cmd_tx,
            _task: task,
        }
    }

    pub fn send(&self, cmd: LinkCmd) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| LinkError::Closed("Lifecycle task is not running".to_string()))
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<LinkCmd> {
        self.cmd_tx.clone()
    }
}

// ── Background task ─────────────────────────────────────────────────────────

type Opened = (Box<dyn Transport>, BTreeMap<String, String>);
type OpenFuture = Pin<Box<dyn Future<Output = Result<Opened>> + Send>>;

enum Wake {
    Cmd(Option<LinkCmd>),
    Network(Option<bool>),
    Opened(Result<Opened>),
    Frame(Option<Result<TransportFrame>>),
    AckTimeout,
    LivenessExpired,
    SubscribeAckDue,
    ReconnectDue,
    GraceExpired,
}

struct LinkTask {
    cmd_rx: mpsc::UnboundedReceiver<LinkCmd>,
    net_rx: mpsc::UnboundedReceiver<bool>,
    net_open: bool,
    _net_subscription: ReachabilitySubscription,

    coordinator: HandshakeCoordinator,
    connector: Arc<dyn Connector>,
    status: ConnectionStatusMonitor,
    handlers: EventHandlers,
    timeouts: LinkTimeouts,
    options: ConnectionOptions,
    mux: SubscriptionMultiplexer,

    phase: SocketPhase,
    opening: Option<OpenFuture>,
    transport: Option<Box<dyn Transport>>,
    protocol_headers: BTreeMap<String, String>,
    ack_deadline: Option<Instant>,
    keepalive_window: Duration,
    liveness_deadline: Option<Instant>,
    last_liveness_ms: Option<u64>,
    incarnation: u64,
    reconnect: ReconnectState,
    jitter_seed: u64,
    online: bool,
}

/// Handshake through the side-channel context, then connect with the
/// result before it expires.
fn open_socket(coordinator: HandshakeCoordinator, connector: Arc<dyn Connector>) -> OpenFuture {
    Box::pin(async move {
        let mut ctx = OperationContext::new();
        run_non_terminating(&mut ctx, HANDSHAKE_KEY, coordinator.stage()).await?;
        let info = ctx.take::<HandshakeInfo>(HANDSHAKE_KEY).ok_or_else(|| {
            LinkError::ProtocolError("handshake stage left no connect info".to_string())
        })?;

        let transport = tokio::time::timeout_at(info.valid_until, connector.connect(&info))
            .await
            .map_err(|_| LinkError::HandshakeTimeout(coordinator.window()))??;
        Ok((transport, info.protocol_headers))
    })
}

async fn poll_opening(opening: &mut Option<OpenFuture>) -> Result<Opened> {
    match opening {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn recv_frame(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<TransportFrame>> {
    match transport {
        Some(t) => t.next_frame().await,
        None => std::future::pending().await,
    }
}

fn deadline_after(timeout: Duration) -> Option<Instant> {
    if LinkTimeouts::is_no_timeout(timeout) {
        None
    } else {
        Some(Instant::now() + timeout)
    }
}

impl LinkTask {
    fn new(
        config: LinkConfig,
        cmd_rx: mpsc::UnboundedReceiver<LinkCmd>,
        net_rx: mpsc::UnboundedReceiver<bool>,
        net_subscription: ReachabilitySubscription,
        online: bool,
    ) -> Self {
        let mux = SubscriptionMultiplexer::new(config.timeouts.subscribe_timeout);
        Self {
            cmd_rx,
            net_rx,
            net_open: true,
            _net_subscription: net_subscription,
            coordinator: config.coordinator,
            connector: config.connector,
            status: config.status,
            handlers: config.handlers,
            keepalive_window: config.timeouts.keepalive_fallback,
            timeouts: config.timeouts,
            options: config.options,
            mux,
            phase: SocketPhase::Closed,
            opening: None,
            transport: None,
            protocol_headers: BTreeMap::new(),
            ack_deadline: None,
            liveness_deadline: None,
            last_liveness_ms: None,
            incarnation: 0,
            reconnect: ReconnectState::default(),
            jitter_seed: jitter_seed(),
            online,
        }
    }

    async fn run(mut self) {
        log::debug!("[realtime-link] Lifecycle task started");
        loop {
            match self.next_wake().await {
                Wake::Cmd(Some(cmd)) => {
                    if !self.handle_cmd(cmd).await {
                        return;
                    }
                },
                Wake::Cmd(None) => {
                    self.shutdown(DisconnectReason::new("Client dropped")).await;
                    return;
                },
                Wake::Network(Some(online)) => self.handle_network(online).await,
                Wake::Network(None) => self.net_open = false,
                Wake::Opened(result) => {
                    self.opening = None;
                    self.handle_opened(result).await;
                },
                Wake::Frame(frame) => self.handle_frame(frame).await,
                Wake::AckTimeout => {
                    self.ack_deadline = None;
                    let timeout = self.timeouts.connection_ack_timeout;
                    self.open_failed(LinkError::AckTimeout(timeout)).await;
                },
                Wake::LivenessExpired => {
                    self.liveness_deadline = None;
                    log::warn!(
                        "[realtime-link] No message within keep-alive window {:?}",
                        self.keepalive_window
                    );
                    let reason =
                        DisconnectReason::new(format!("Keep-alive timeout ({:?})", self.keepalive_window));
                    self.connection_lost(reason).await;
                },
                Wake::SubscribeAckDue => {
                    for id in self.mux.expire_acks(Instant::now()) {
                        self.send_stop(id).await;
                    }
                    if self.mux.is_empty() {
                        self.teardown_idle().await;
                    }
                },
                Wake::ReconnectDue => {
                    self.reconnect.next_attempt_at = None;
                    if self.mux.is_empty() {
                        self.reconnect.reset();
                    } else {
                        self.reconnect.attempt += 1;
                        self.begin_open();
                    }
                },
                Wake::GraceExpired => {
                    self.reconnect.offline_deadline = None;
                    let grace = self.timeouts.offline_grace_period;
                    self.give_up(format!("Offline for longer than {:?}", grace));
                },
            }
        }
    }

    async fn next_wake(&mut self) -> Wake {
        let far = Instant::now() + FAR_FUTURE;
        let ack_at = self.ack_deadline;
        let live_at = self.liveness_deadline;
        let sub_ack_at = self.mux.next_ack_deadline();
        let retry_at = self.reconnect.next_attempt_at;
        let grace_at = self.reconnect.offline_deadline;
        let net_open = self.net_open;

        tokio::select! {
            biased;

            cmd = self.cmd_rx.recv() => Wake::Cmd(cmd),
            online = self.net_rx.recv(), if net_open => Wake::Network(online),
            opened = poll_opening(&mut self.opening) => Wake::Opened(opened),
            frame = recv_frame(&mut self.transport) => Wake::Frame(frame),
            _ = sleep_until(ack_at.unwrap_or(far)), if ack_at.is_some() => Wake::AckTimeout,
            _ = sleep_until(live_at.unwrap_or(far)), if live_at.is_some() => Wake::LivenessExpired,
            _ = sleep_until(sub_ack_at.unwrap_or(far)), if sub_ack_at.is_some() => Wake::SubscribeAckDue,
            _ = sleep_until(retry_at.unwrap_or(far)), if retry_at.is_some() => Wake::ReconnectDue,
            _ = sleep_until(grace_at.unwrap_or(far)), if grace_at.is_some() => Wake::GraceExpired,
        }
    }

    /// Returns `false` when the task should stop.
    async fn handle_cmd(&mut self, cmd: LinkCmd) -> bool {
        match cmd {
            LinkCmd::Subscribe {
                key,
                request,
                delivery_tx,
            } => {
                log::debug!("[realtime-link] Subscribe #{}: {}", key, request.query);
                self.mux.insert(key, request, delivery_tx);
                match self.phase {
                    SocketPhase::Open => self.send_pending_starts().await,
                    SocketPhase::Closed if !self.reconnect.active => self.begin_open(),
                    // Buffered until the pending open or reconnect succeeds.
                    _ => {},
                }
            },
            LinkCmd::Unsubscribe { key } => {
                let Some(wire_id) = self.mux.remove(key) else {
                    log::debug!("[realtime-link] Ignoring unsubscribe for unknown #{}", key);
                    return true;
                };
                log::debug!("[realtime-link] Unsubscribe #{} (wire id {:?})", key, wire_id);
                if let Some(id) = wire_id {
                    self.send_stop(id).await;
                }
                if self.mux.is_empty() {
                    self.teardown_idle().await;
                }
            },
            LinkCmd::ListSubscriptions { result_tx } => {
                let _ = result_tx.send(self.mux.snapshot());
            },
            LinkCmd::SocketState { result_tx } => {
                let _ = result_tx.send(self.socket_state());
            },
            LinkCmd::Disconnect { done_tx } => {
                self.cmd_rx.close();
                self.shutdown(DisconnectReason::new("Client disconnected")).await;
                let _ = done_tx.send(());
                return false;
            },
        }
        true
    }

    async fn handle_network(&mut self, online: bool) {
        if online == self.online {
            return;
        }
        self.online = online;
        if online {
            if self.reconnect.suspended {
                log::info!("[realtime-link] Network is back, reconnecting now");
                self.reconnect.resume();
            }
        } else if self.reconnect.next_attempt_at.is_some() {
            log::info!("[realtime-link] Network went offline, suspending reconnect");
            self.reconnect.suspend(self.grace_period());
        } else if self.phase == SocketPhase::Connecting && !self.mux.is_empty() {
            self.abort_open_offline().await;
        }
    }

    /// An open in flight when the network drops is abandoned. A reconnect
    /// attempt gets its slot back and the cycle waits for the network.
    async fn abort_open_offline(&mut self) {
        log::info!("[realtime-link] Network went offline mid-open, suspending reconnect");
        self.close_transport().await;
        self.mux.reset_wire_ids();
        self.status.disconnected();
        if self.reconnect.active {
            self.reconnect.attempt = self.reconnect.attempt.saturating_sub(1);
        }
        self.reconnect.active = true;
        self.reconnect.suspend(self.grace_period());
    }

    fn grace_period(&self) -> Option<Duration> {
        let grace = self.timeouts.offline_grace_period;
        (!LinkTimeouts::is_no_timeout(grace)).then_some(grace)
    }

    fn begin_open(&mut self) {
        log::info!(
            "[realtime-link] Opening socket (reconnect attempt {})",
            self.reconnect.attempt
        );
        self.phase = SocketPhase::Connecting;
        self.status.opening_socket();
        self.opening = Some(open_socket(self.coordinator.clone(), self.connector.clone()));
    }

    async fn handle_opened(&mut self, result: Result<Opened>) {
        match result {
            Ok((transport, headers)) => {
                self.transport = Some(transport);
                self.protocol_headers = headers;
                if let Err(e) = self.send(&ClientMessage::ConnectionInit).await {
                    self.open_failed(e).await;
                    return;
                }
                self.ack_deadline = deadline_after(self.timeouts.connection_ack_timeout);
                log::debug!("[realtime-link] Socket open, awaiting connection_ack");
            },
            Err(e) => self.open_failed(e).await,
        }
    }

    /// An open attempt failed before `connection_ack`.
    ///
    /// Fatal failures of an attempt started by a subscription are surfaced
    /// to every waiting subscription; everything else goes down the
    /// reconnect path.
    async fn open_failed(&mut self, err: LinkError) {
        log::warn!("[realtime-link] Socket open failed: {}", err);
        self.close_transport().await;
        let fatal = err.is_fatal_open() && !self.reconnect.active;
        self.handlers.emit_error(ConnectionError::new(err.to_string(), !fatal));
        if fatal {
            self.mux.fail_all(&err);
            self.reconnect.reset();
            self.status.disconnected();
            self.status.disconnecting();
        } else {
            self.status.disconnected();
            self.schedule_reconnect();
        }
    }

    async fn handle_frame(&mut self, frame: Option<Result<TransportFrame>>) {
        match frame {
            Some(Ok(TransportFrame::Text(text))) => self.handle_text(text).await,
            Some(Ok(TransportFrame::Closed(reason))) => {
                let reason = reason.unwrap_or_else(|| DisconnectReason::new("Server closed connection"));
                self.connection_lost(reason).await;
            },
            Some(Err(e)) => {
                self.handlers.emit_error(ConnectionError::new(e.to_string(), true));
                self.connection_lost(DisconnectReason::new(format!("Socket error: {}", e))).await;
            },
            None => self.connection_lost(DisconnectReason::new("Socket stream ended")).await,
        }
    }

    async fn handle_text(&mut self, text: String) {
        self.handlers.emit_receive(&text);
        if self.phase == SocketPhase::Open {
            self.touch_liveness();
        }
        let message = match ServerMessage::parse(&text) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[realtime-link] Dropping malformed message: {}", e);
                return;
            },
        };
        match self.phase {
            SocketPhase::Connecting => self.handle_init_reply(message).await,
            SocketPhase::Open => self.handle_open_message(message).await,
            phase => log::debug!("[realtime-link] Ignoring message while {:?}", phase),
        }
    }

    async fn handle_init_reply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::ConnectionAck { .. } => {
                let window = message.keepalive_window().unwrap_or(self.timeouts.keepalive_fallback);
                self.on_acknowledged(window).await;
            },
            ServerMessage::ConnectionError { payload } | ServerMessage::Error { id: None, payload } => {
                self.open_failed(LinkError::ConnectionRejected(payload.to_string())).await;
            },
            ServerMessage::Ka => log::debug!("[realtime-link] Keep-alive before connection_ack"),
            other => log::debug!("[realtime-link] Ignoring {:?} before connection_ack", other),
        }
    }

    async fn on_acknowledged(&mut self, window: Duration) {
        self.ack_deadline = None;
        self.phase = SocketPhase::Open;
        self.incarnation += 1;
        self.mux.set_incarnation(self.incarnation);
        self.keepalive_window = window;
        self.touch_liveness();

        if self.reconnect.active {
            log::info!(
                "[realtime-link] Reconnected after {} attempt(s), re-issuing {} subscription(s)",
                self.reconnect.attempt,
                self.mux.len()
            );
        } else {
            log::info!("[realtime-link] Socket acknowledged (keep-alive window {:?})", window);
        }
        self.reconnect.reset();

        self.status.connection_established();
        self.handlers.emit_connect();
        self.send_pending_starts().await;
    }

    async fn handle_open_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Ka => {},
            ServerMessage::StartAck { .. }
            | ServerMessage::Data { .. }
            | ServerMessage::Complete { .. }
            | ServerMessage::Error { id: Some(_), .. } => {
                if self.mux.route(message) == Routed::Removed && self.mux.is_empty() {
                    self.teardown_idle().await;
                }
            },
            ServerMessage::Error { id: None, payload } => {
                log::warn!("[realtime-link] Server error without subscription id: {}", payload);
                self.handlers
                    .emit_error(ConnectionError::new(format!("Server error: {}", payload), true));
            },
            ServerMessage::Unknown => {
                log::debug!("[realtime-link] Dropping message of unknown type");
            },
            other => log::debug!("[realtime-link] Ignoring unexpected {:?}", other),
        }
    }

    fn touch_liveness(&mut self) {
        self.liveness_deadline = deadline_after(self.keepalive_window);
        self.last_liveness_ms = Some(now_ms());
    }

    async fn send_pending_starts(&mut self) {
        let starts = self.mux.prepare_starts(Instant::now(), &self.protocol_headers);
        for start in starts {
            if let Err(e) = self.send(&start).await {
                log::warn!("[realtime-link] Failed to send start: {}", e);
                self.connection_lost(DisconnectReason::new(format!("Send failed: {}", e))).await;
                return;
            }
        }
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let text = message.to_json()?;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| LinkError::Closed("No open socket".to_string()))?;
        self.handlers.emit_send(&text);
        transport.send_text(text).await
    }

    /// Best effort; a `stop` is never acknowledged.
    async fn send_stop(&mut self, id: String) {
        if self.phase != SocketPhase::Open {
            return;
        }
        if let Err(e) = self.send(&ClientMessage::Stop { id: id.clone() }).await {
            log::debug!("[realtime-link] Failed to send stop for {}: {}", id, e);
        }
    }

    async fn close_transport(&mut self) {
        self.opening = None;
        self.ack_deadline = None;
        self.liveness_deadline = None;
        self.last_liveness_ms = None;
        if let Some(mut transport) = self.transport.take() {
            self.phase = SocketPhase::Closing;
            transport.close().await;
        }
        self.phase = SocketPhase::Closed;
    }

    /// Unexpected close, transport error, or liveness expiry.
    async fn connection_lost(&mut self, reason: DisconnectReason) {
        let was_open = self.phase == SocketPhase::Open;
        log::warn!("[realtime-link] Connection lost: {}", reason);
        self.close_transport().await;
        self.mux.reset_wire_ids();
        self.status.disconnected();
        if was_open {
            self.handlers.emit_disconnect(reason);
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        let wanted = self.status.current().intended_connection_state == IntendedState::Connected;
        if self.mux.is_empty() || !wanted {
            self.reconnect.reset();
            return;
        }
        if !self.options.auto_reconnect {
            self.give_up("Connection lost and auto-reconnect is disabled".to_string());
            return;
        }
        self.reconnect.active = true;

        if let Some(max) = self.options.max_reconnect_attempts {
            if self.reconnect.attempt >= max {
                self.give_up(format!("Max reconnection attempts ({}) reached", max));
                return;
            }
        }

        if !self.online {
            log::info!("[realtime-link] Offline, reconnect suspended until the network returns");
            self.reconnect.suspend(self.grace_period());
            return;
        }

        let delay = backoff_delay(
            &self.options,
            self.reconnect.attempt,
            self.jitter_seed ^ self.incarnation,
        );
        self.reconnect.next_attempt_at = Some(Instant::now() + delay);
        log::info!(
            "[realtime-link] Attempting reconnection in {:?} (attempt {})",
            delay,
            self.reconnect.attempt + 1
        );
        self.handlers.emit_reconnect_scheduled(self.reconnect.attempt + 1, delay);
    }

    fn give_up(&mut self, message: String) {
        log::warn!("[realtime-link] Giving up: {}", message);
        self.handlers.emit_error(ConnectionError::new(message.clone(), false));
        self.mux.fail_all(&LinkError::ConnectionLost(message));
        self.reconnect.reset();
        self.status.disconnecting();
    }

    /// The last subscription detached.
    async fn teardown_idle(&mut self) {
        log::info!("[realtime-link] No subscriptions left, closing socket");
        let was_open = self.phase == SocketPhase::Open;
        self.status.disconnecting();
        self.close_transport().await;
        self.reconnect.reset();
        self.status.disconnected();
        if was_open {
            self.handlers.emit_disconnect(DisconnectReason::new("No active subscriptions"));
        }
    }

    async fn shutdown(&mut self, reason: DisconnectReason) {
        log::info!("[realtime-link] Shutting down: {}", reason);
        for id in self.mux.close_all() {
            self.send_stop(id).await;
        }
        let was_open = self.phase == SocketPhase::Open;
        self.status.disconnecting();
        self.close_transport().await;
        self.reconnect.reset();
        self.status.disconnected();
        if was_open {
            self.handlers.emit_disconnect(reason);
        }
    }

    fn socket_state(&self) -> SocketState {
        SocketState {
            phase: self.phase,
            last_liveness_at_ms: self.last_liveness_ms,
            reconnect_attempt: self.reconnect.attempt,
            incarnation: self.incarnation,
        }
    }
}
