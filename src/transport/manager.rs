//! Connection manager.
//!
//! Owns the one logical connection: its transport handle, its
//! [`ConnectionState`], the heartbeat, and the reconnect policy.
//!
//! # Event Loop
//!
//! [`ConnectionManager::spawn`] starts a tokio task that is the only
//! place the transport is touched. The task moves through four phases:
//!
//! | Phase | State | Leaves on |
//! |-------|-------|-----------|
//! | idle | `disconnected` | `connect` command |
//! | connecting | `connecting` | handshake result, `disconnect`, endpoint change |
//! | connected | `connected` | transport failure, heartbeat timeout, `disconnect`, endpoint change |
//! | waiting | `disconnected` | backoff timer, `connect`, `disconnect` |
//!
//! Inbound frames are handed to the [`EventDispatcher`] from inside the
//! task, so dispatch order is transport order, and a session's
//! disconnect notification is always dispatched before the next
//! session's connect.
//!
//! Dropping an in-flight handshake future aborts it, so a handshake that
//! would complete after `disconnect()` is never promoted to `connected`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, sleep_until, timeout};
use tracing::{debug, error, info, warn};

use crate::dispatch::{DisconnectInfo, DisconnectReason, EventDispatcher, SessionInfo};
use crate::error::{Error, ErrorNotice, NoticeKind, Result};
use crate::identifiers::SessionId;
use crate::protocol::Action;
use crate::realtime::RealtimeOptions;

use super::backoff::Backoff;
use super::connection::{Connector, Transport, TransportEvent};
use super::endpoint::Endpoint;
use super::state::ConnectionState;

// ============================================================================
// ManagerCommand
// ============================================================================

/// Commands for the manager task.
enum ManagerCommand {
    /// Connect (or stay connected) to an endpoint.
    Connect(Endpoint),
    /// Close and stop reconnecting.
    Disconnect,
    /// Send an action on the live transport.
    Send(Action),
    /// Close and terminate the task.
    Shutdown,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Handle to the connection manager task.
///
/// All methods are non-blocking: they enqueue a command and return.
/// Dropping the last handle shuts the task down.
#[derive(Debug)]
pub struct ConnectionManager {
    /// Channel for sending commands to the task.
    command_tx: mpsc::UnboundedSender<ManagerCommand>,
    /// Published connection state.
    state_rx: watch::Receiver<ConnectionState>,
}

impl std::fmt::Debug for ManagerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(endpoint) => f.debug_tuple("Connect").field(endpoint).finish(),
            Self::Disconnect => f.write_str("Disconnect"),
            Self::Send(action) => f.debug_tuple("Send").field(&action.name()).finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl ConnectionManager {
    /// Spawns the manager task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        dispatcher: Arc<EventDispatcher>,
        options: RealtimeOptions,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task = ManagerTask {
            backoff: Backoff::new(options.backoff),
            connector,
            dispatcher,
            options,
            command_rx,
            state_tx,
            endpoint: None,
        };

        tokio::spawn(task.run());

        Self {
            command_tx,
            state_rx,
        }
    }

    /// Connects to `endpoint`.
    ///
    /// No-op if already connecting or connected to the same endpoint.
    /// A different endpoint tears the current transport down first.
    ///
    /// # Errors
    ///
    /// [`Error::ManagerClosed`] if the task has terminated.
    pub fn connect(&self, endpoint: Endpoint) -> Result<()> {
        self.command(ManagerCommand::Connect(endpoint))
    }

    /// Closes the transport, cancels any pending reconnect, and stays
    /// disconnected until [`ConnectionManager::connect`] is called again.
    /// Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// [`Error::ManagerClosed`] if the task has terminated.
    pub fn disconnect(&self) -> Result<()> {
        self.command(ManagerCommand::Disconnect)
    }

    /// Sends an action on the live transport.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the state is not `connected`
    /// - [`Error::ManagerClosed`] if the task has terminated
    pub fn send(&self, action: Action) -> Result<()> {
        if !self.state().is_connected() {
            return Err(Error::NotConnected);
        }
        self.command(ManagerCommand::Send(action))
    }

    /// Closes the transport and terminates the task.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ManagerCommand::Shutdown);
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Returns a receiver that observes every state change.
    #[inline]
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Returns `true` once the task has terminated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    fn command(&self, command: ManagerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::ManagerClosed)
    }
}

// ============================================================================
// ManagerTask
// ============================================================================

/// Where the task is in its lifecycle.
enum Phase {
    Idle,
    Connecting,
    Connected(Box<dyn Transport>, SessionId),
    Waiting(Duration),
    Stopped,
}

/// How a connected session ended.
enum SessionEnd {
    Requested,
    EndpointChanged,
    Shutdown,
    Failed(Error),
}

/// State owned by the manager task.
struct ManagerTask {
    connector: Arc<dyn Connector>,
    dispatcher: Arc<EventDispatcher>,
    options: RealtimeOptions,
    command_rx: mpsc::UnboundedReceiver<ManagerCommand>,
    state_tx: watch::Sender<ConnectionState>,
    backoff: Backoff,
    /// Endpoint of the current logical session.
    endpoint: Option<Endpoint>,
}

impl ManagerTask {
    async fn run(mut self) {
        debug!("Connection manager started");

        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connecting => self.connecting().await,
                Phase::Connected(transport, session_id) => {
                    self.connected(transport, session_id).await
                }
                Phase::Waiting(delay) => self.waiting(delay).await,
                Phase::Stopped => break,
            };
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("Connection manager terminated");
    }

    // ========================================================================
    // Phases
    // ========================================================================

    async fn idle(&mut self) -> Phase {
        self.set_state(ConnectionState::Disconnected);

        loop {
            match self.command_rx.recv().await {
                Some(ManagerCommand::Connect(endpoint)) => {
                    self.endpoint = Some(endpoint);
                    self.backoff.reset();
                    return Phase::Connecting;
                }
                Some(ManagerCommand::Disconnect) => {
                    debug!("Disconnect while idle ignored");
                }
                Some(ManagerCommand::Send(action)) => {
                    warn!(action = action.name(), "Dropping action, not connected");
                }
                Some(ManagerCommand::Shutdown) | None => return Phase::Stopped,
            }
        }
    }

    async fn connecting(&mut self) -> Phase {
        let Some(endpoint) = self.endpoint.clone() else {
            return Phase::Idle;
        };

        self.set_state(ConnectionState::Connecting);

        let retries = self.backoff.attempt();
        info!(endpoint = %endpoint, retries, "Connecting");

        let connect_timeout = self.options.connect_timeout;
        let connector = Arc::clone(&self.connector);
        let handshake = timeout(connect_timeout, connector.connect(&endpoint));
        tokio::pin!(handshake);

        loop {
            tokio::select! {
                result = &mut handshake => {
                    let result = match result {
                        Ok(inner) => inner,
                        Err(_) => Err(Error::connection_timeout(connect_timeout.as_millis() as u64)),
                    };

                    return match result {
                        Ok(transport) => {
                            let session_id = SessionId::next();
                            self.backoff.reset();
                            self.set_state(ConnectionState::Connected);
                            info!(%session_id, endpoint = %endpoint, "Connected");

                            self.dispatcher.on_connect(SessionInfo {
                                session_id,
                                url: endpoint.url().to_string(),
                                retries,
                            });

                            Phase::Connected(transport, session_id)
                        }
                        Err(err) => {
                            warn!(error = %err, retries, "Connection attempt failed");
                            self.set_state(ConnectionState::Disconnected);

                            let delay = self.backoff.next_delay();
                            self.dispatcher.on_error(ErrorNotice::from_transport(&err));
                            self.retry_after(delay)
                        }
                    };
                }

                command = self.command_rx.recv() => match command {
                    Some(ManagerCommand::Connect(next)) => {
                        if self.endpoint.as_ref() == Some(&next) {
                            debug!("Already connecting to this endpoint");
                            continue;
                        }
                        info!(endpoint = %next, "Endpoint changed during handshake");
                        self.endpoint = Some(next);
                        self.backoff.reset();
                        return Phase::Connecting;
                    }
                    Some(ManagerCommand::Disconnect) => {
                        info!("Handshake cancelled by disconnect");
                        return Phase::Idle;
                    }
                    Some(ManagerCommand::Send(action)) => {
                        warn!(action = action.name(), "Dropping action, handshake in flight");
                    }
                    Some(ManagerCommand::Shutdown) | None => return Phase::Stopped,
                },
            }
        }
    }

    async fn connected(&mut self, mut transport: Box<dyn Transport>, session_id: SessionId) -> Phase {
        let heartbeat_interval = self.options.heartbeat_interval;
        let heartbeat_timeout = self.options.heartbeat_timeout;
        // Bounds every write and the final close.
        let write_timeout = heartbeat_timeout;

        let mut heartbeat = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Set when a ping goes out, cleared by any inbound frame.
        let mut pong_deadline: Option<Instant> = None;

        let end = loop {
            let deadline = pong_deadline;

            tokio::select! {
                event = transport.next_event() => match event {
                    Ok(TransportEvent::Text(text)) => {
                        pong_deadline = None;
                        self.dispatcher.on_frame(session_id, &text);
                    }
                    Ok(TransportEvent::Pong) => pong_deadline = None,
                    Ok(TransportEvent::Closed { code, reason }) => {
                        break SessionEnd::Failed(Error::connection_closed(code, reason));
                    }
                    Err(err) => break SessionEnd::Failed(err),
                },

                command = self.command_rx.recv() => match command {
                    Some(ManagerCommand::Connect(next)) => {
                        if self.endpoint.as_ref() == Some(&next) {
                            debug!(%session_id, "Already connected to this endpoint");
                            continue;
                        }
                        info!(%session_id, endpoint = %next, "Endpoint changed, reconnecting");
                        self.endpoint = Some(next);
                        break SessionEnd::EndpointChanged;
                    }
                    Some(ManagerCommand::Disconnect) => break SessionEnd::Requested,
                    Some(ManagerCommand::Send(action)) => {
                        if let Err(err) = send_action(transport.as_mut(), &action, write_timeout).await {
                            if err.is_transport_error() {
                                break SessionEnd::Failed(err);
                            }
                            warn!(action = action.name(), error = %err, "Failed to encode action");
                        }
                    }
                    Some(ManagerCommand::Shutdown) | None => break SessionEnd::Shutdown,
                },

                _ = heartbeat.tick() => {
                    if pong_deadline.is_none() {
                        if let Err(err) = send_action(transport.as_mut(), &Action::ping(), write_timeout).await {
                            break SessionEnd::Failed(err);
                        }
                        pong_deadline = Some(Instant::now() + heartbeat_timeout);
                    }
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    break SessionEnd::Failed(Error::heartbeat_timeout(
                        heartbeat_timeout.as_millis() as u64,
                    ));
                }
            }
        };

        if timeout(write_timeout, transport.close()).await.is_err() {
            warn!(%session_id, "Transport close timed out, dropping it");
        }
        drop(transport);
        self.set_state(ConnectionState::Disconnected);

        match end {
            SessionEnd::Requested => {
                info!(%session_id, "Disconnected by request");
                self.dispatcher.on_disconnect(DisconnectInfo {
                    session_id,
                    reason: DisconnectReason::Requested,
                    will_reconnect: false,
                });
                Phase::Idle
            }

            SessionEnd::Shutdown => {
                self.dispatcher.on_disconnect(DisconnectInfo {
                    session_id,
                    reason: DisconnectReason::Requested,
                    will_reconnect: false,
                });
                Phase::Stopped
            }

            SessionEnd::EndpointChanged => {
                self.dispatcher.on_disconnect(DisconnectInfo {
                    session_id,
                    reason: DisconnectReason::EndpointChanged,
                    will_reconnect: true,
                });
                self.backoff.reset();
                Phase::Connecting
            }

            SessionEnd::Failed(err) => {
                warn!(%session_id, error = %err, "Connection lost");

                let notice = ErrorNotice::from_transport(&err);
                let delay = self.backoff.next_delay();

                self.dispatcher.on_disconnect(DisconnectInfo {
                    session_id,
                    reason: DisconnectReason::Lost {
                        description: notice.message.clone(),
                    },
                    will_reconnect: delay.is_some(),
                });
                self.dispatcher.on_error(notice);

                self.retry_after(delay)
            }
        }
    }

    async fn waiting(&mut self, delay: Duration) -> Phase {
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempt(),
            "Reconnect scheduled"
        );

        let timer = sleep(delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => return Phase::Connecting,

                command = self.command_rx.recv() => match command {
                    Some(ManagerCommand::Connect(next)) => {
                        debug!(endpoint = %next, "Connect requested during backoff");
                        if self.endpoint.as_ref() != Some(&next) {
                            self.backoff.reset();
                        }
                        self.endpoint = Some(next);
                        return Phase::Connecting;
                    }
                    Some(ManagerCommand::Disconnect) => {
                        info!("Pending reconnect cancelled");
                        return Phase::Idle;
                    }
                    Some(ManagerCommand::Send(action)) => {
                        warn!(action = action.name(), "Dropping action, not connected");
                    }
                    Some(ManagerCommand::Shutdown) | None => return Phase::Stopped,
                },
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Moves to the backoff phase, or gives up when the policy is spent.
    fn retry_after(&self, delay: Option<Duration>) -> Phase {
        match delay {
            Some(delay) => Phase::Waiting(delay),
            None => {
                error!(
                    attempts = self.backoff.attempt(),
                    "Reconnect attempts exhausted"
                );
                self.dispatcher.on_error(ErrorNotice::new(
                    NoticeKind::RetriesExhausted,
                    "gave up reconnecting",
                ));
                Phase::Idle
            }
        }
    }

    /// Publishes a state change. Only legal edges are ever taken.
    fn set_state(&self, next: ConnectionState) {
        let prev = *self.state_tx.borrow();
        if prev == next {
            return;
        }

        debug_assert!(
            prev.can_transition_to(next),
            "illegal state transition {prev} -> {next}"
        );

        self.state_tx.send_replace(next);
        info!(from = %prev, to = %next, "Connection state changed");
    }
}

/// Encodes and sends one action, failing if the write stalls past `limit`.
async fn send_action(transport: &mut dyn Transport, action: &Action, limit: Duration) -> Result<()> {
    let json = action.to_json()?;
    match timeout(limit, transport.send_text(json)).await {
        Ok(result) => result,
        Err(_) => Err(Error::connection(format!(
            "write stalled for {}ms",
            limit.as_millis()
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    use crate::dispatch::SubscriberRegistry;
    use crate::unread::UnreadAggregator;

    /// Counts attempts and never finishes a handshake.
    struct StalledConnector {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for StalledConnector {
        async fn connect(&self, _endpoint: &Endpoint) -> Result<Box<dyn Transport>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    fn spawn() -> (ConnectionManager, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let connector = StalledConnector {
            attempts: Arc::clone(&attempts),
        };
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::new(SubscriberRegistry::new()),
            Arc::new(UnreadAggregator::new()),
        ));
        let manager = ConnectionManager::spawn(Arc::new(connector), dispatcher, RealtimeOptions::new());
        (manager, attempts)
    }

    /// Accepts at once, then never completes a read, write or close.
    struct FrozenSocketConnector {
        attempts: Arc<AtomicUsize>,
    }

    struct FrozenTransport;

    #[async_trait]
    impl Transport for FrozenTransport {
        async fn send_text(&mut self, _text: String) -> Result<()> {
            std::future::pending().await
        }

        async fn next_event(&mut self) -> Result<TransportEvent> {
            std::future::pending().await
        }

        async fn close(&mut self) {
            std::future::pending::<()>().await;
        }
    }

    #[async_trait]
    impl Connector for FrozenSocketConnector {
        async fn connect(&self, _endpoint: &Endpoint) -> Result<Box<dyn Transport>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FrozenTransport))
        }
    }

    fn spawn_frozen() -> (ConnectionManager, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let connector = FrozenSocketConnector {
            attempts: Arc::clone(&attempts),
        };
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::new(SubscriberRegistry::new()),
            Arc::new(UnreadAggregator::new()),
        ));
        let options = RealtimeOptions::new()
            .with_heartbeat(Duration::from_secs(1), Duration::from_secs(1));
        let manager = ConnectionManager::spawn(Arc::new(connector), dispatcher, options);
        (manager, attempts)
    }

    fn endpoint() -> Endpoint {
        Endpoint::anonymous("ws://localhost:8000/ws/").expect("valid")
    }

    async fn wait_for(manager: &ConnectionManager, state: ConnectionState) {
        let mut rx = manager.subscribe_state();
        timeout(Duration::from_secs(60), rx.wait_for(|s| *s == state))
            .await
            .expect("state reached")
            .expect("task alive");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_connect_is_single_attempt() {
        let (manager, attempts) = spawn();

        manager.connect(endpoint()).expect("connect");
        manager.connect(endpoint()).expect("connect");
        wait_for(&manager, ConnectionState::Connecting).await;
        sleep(Duration::from_secs(1)).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_twice() {
        let (manager, _) = spawn();

        assert_ok!(manager.disconnect());
        assert_ok!(manager.connect(endpoint()));
        wait_for(&manager, ConnectionState::Connecting).await;

        assert_ok!(manager.disconnect());
        assert_ok!(manager.disconnect());
        wait_for(&manager, ConnectionState::Disconnected).await;
        assert!(!manager.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_connecting_fails() {
        let (manager, _) = spawn();

        manager.connect(endpoint()).expect("connect");
        wait_for(&manager, ConnectionState::Connecting).await;

        assert!(matches!(
            manager.send(Action::ping()),
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_task() {
        let (manager, _) = spawn();

        manager.shutdown();
        timeout(Duration::from_secs(60), async {
            while !manager.is_closed() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("task terminated");

        assert!(matches!(
            assert_err!(manager.connect(endpoint())),
            Error::ManagerClosed
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_heartbeat_write_drops_session() {
        let (manager, attempts) = spawn_frozen();

        manager.connect(endpoint()).expect("connect");
        wait_for(&manager, ConnectionState::Connected).await;

        // Ping write stalls, the close stalls too, and the manager still
        // moves on to a reconnect.
        wait_for(&manager, ConnectionState::Disconnected).await;
        wait_for(&manager, ConnectionState::Connected).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_with_stalled_close() {
        let (manager, _) = spawn_frozen();

        manager.connect(endpoint()).expect("connect");
        wait_for(&manager, ConnectionState::Connected).await;

        assert_ok!(manager.disconnect());
        wait_for(&manager, ConnectionState::Disconnected).await;
        assert!(!manager.is_closed());

        assert_ok!(manager.connect(endpoint()));
        wait_for(&manager, ConnectionState::Connected).await;
    }
}
