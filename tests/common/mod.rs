//! Shared test fixtures: a scripted connector, an event recorder, and a
//! real WebSocket server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{self, StatusCode};
use tracing_subscriber::EnvFilter;

use safar_realtime::{
    ConnectionState, Connector, DisconnectReason, Endpoint, Error, Handlers, Realtime,
    RealtimeOptions, Result, Transport, TransportEvent,
};

// ============================================================================
// Setup
// ============================================================================

/// Installs a test-writer subscriber once. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Options whose heartbeat never fires during a test.
pub fn quiet_options() -> RealtimeOptions {
    RealtimeOptions::new().with_heartbeat(Duration::from_secs(24 * 3600), Duration::from_secs(60))
}

pub fn endpoint(token: &str) -> Endpoint {
    Endpoint::new("ws://booking.test/ws/", token).expect("valid endpoint")
}

pub fn realtime(connector: MockConnector, options: RealtimeOptions) -> Realtime {
    init_tracing();
    Realtime::builder()
        .endpoint(endpoint("token-a"))
        .options(options)
        .connector(connector)
        .build()
        .expect("build")
}

/// Waits (in virtual time) until the facade reaches `state`.
pub async fn wait_for_state(realtime: &Realtime, state: ConnectionState) {
    let mut rx = realtime.state_changes();
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("state {state} not reached"))
        .expect("manager alive");
}

// ============================================================================
// Frames
// ============================================================================

pub fn message_frame(text: &str) -> String {
    serde_json::json!({
        "type": "new_message",
        "payload": {"message": {
            "id": uuid::Uuid::new_v4(),
            "sender": {"id": uuid::Uuid::new_v4(), "first_name": "Omar", "last_name": "Haddad"},
            "message_text": text,
            "is_read": false,
            "created_at": "2024-05-01T09:30:00Z"
        }}
    })
    .to_string()
}

pub fn notification_frame(text: &str) -> String {
    serde_json::json!({
        "type": "new_notification",
        "payload": {"notification": {
            "id": uuid::Uuid::new_v4(),
            "message": text,
            "type": "booking",
            "is_read": false
        }}
    })
    .to_string()
}

// ============================================================================
// Scripted Connector
// ============================================================================

/// What the next connect attempt does.
#[derive(Debug, Clone, Copy)]
pub enum Plan {
    /// Handshake succeeds immediately.
    Accept,
    /// Handshake fails immediately.
    Fail,
    /// Handshake never completes.
    Hang,
    /// Handshake succeeds after a delay.
    AcceptAfter(Duration),
}

#[derive(Default)]
struct Shared {
    plans: VecDeque<Plan>,
    attempts: Vec<(Instant, Endpoint)>,
    closed: usize,
}

/// Connector driven by a queue of [`Plan`]s. Unplanned attempts fail.
pub struct MockConnector {
    shared: Arc<Mutex<Shared>>,
    accepted: mpsc::UnboundedSender<ServerSide>,
}

/// Test-side control for a [`MockConnector`].
pub struct MockControl {
    shared: Arc<Mutex<Shared>>,
    accepted: mpsc::UnboundedReceiver<ServerSide>,
}

pub fn mock() -> (MockConnector, MockControl) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MockConnector {
            shared: Arc::clone(&shared),
            accepted: tx,
        },
        MockControl {
            shared,
            accepted: rx,
        },
    )
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>> {
        let plan = {
            let mut shared = self.shared.lock();
            shared.attempts.push((Instant::now(), endpoint.clone()));
            shared.plans.pop_front().unwrap_or(Plan::Fail)
        };

        match plan {
            Plan::Fail => return Err(Error::connection("connection refused")),
            Plan::Hang => std::future::pending::<()>().await,
            Plan::AcceptAfter(delay) => sleep(delay).await,
            Plan::Accept => {}
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let _ = self.accepted.send(ServerSide {
            inbound: inbound_tx,
            outbound: outbound_rx,
        });

        Ok(Box::new(MockTransport {
            inbound: inbound_rx,
            outbound: outbound_tx,
            shared: Arc::clone(&self.shared),
        }))
    }
}

impl MockControl {
    /// Queues plans for upcoming attempts.
    pub fn plan(&self, plans: impl IntoIterator<Item = Plan>) {
        self.shared.lock().plans.extend(plans);
    }

    pub fn attempt_count(&self) -> usize {
        self.shared.lock().attempts.len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.shared.lock().attempts.iter().map(|(t, _)| *t).collect()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.shared.lock().attempts.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Number of transports the manager closed.
    pub fn closed(&self) -> usize {
        self.shared.lock().closed
    }

    /// Waits for the next accepted connection.
    pub async fn accepted(&mut self) -> ServerSide {
        tokio::time::timeout(Duration::from_secs(600), self.accepted.recv())
            .await
            .expect("connection accepted in time")
            .expect("connector alive")
    }

    /// Returns an accepted connection if one is already waiting.
    pub fn try_accepted(&mut self) -> Option<ServerSide> {
        self.accepted.try_recv().ok()
    }
}

/// Server end of a mock transport.
pub struct ServerSide {
    inbound: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl ServerSide {
    /// Pushes a text frame to the client.
    pub fn push(&self, raw: impl Into<String>) {
        let _ = self.inbound.send(TransportEvent::Text(raw.into()));
    }

    /// Closes from the server side.
    pub fn close(&self, code: Option<u16>) {
        let _ = self.inbound.send(TransportEvent::Closed {
            code,
            reason: String::new(),
        });
    }

    /// Waits for the next frame the client sent.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.outbound.recv().await
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<String>,
    shared: Arc<Mutex<Shared>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outbound
            .send(text)
            .map_err(|_| Error::connection("peer gone"))
    }

    async fn next_event(&mut self) -> Result<TransportEvent> {
        match self.inbound.recv().await {
            Some(event) => Ok(event),
            None => Err(Error::connection("peer gone")),
        }
    }

    async fn close(&mut self) {
        self.shared.lock().closed += 1;
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Records every callback as a short string, in delivery order.
#[derive(Clone)]
pub struct Recorder {
    log: Arc<watch::Sender<Vec<String>>>,
}

impl Default for Recorder {
    fn default() -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self { log: Arc::new(tx) }
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: String) {
        self.log.send_modify(|log| log.push(entry));
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Waits until at least `n` entries were recorded.
    pub async fn wait_for(&self, n: usize) -> Vec<String> {
        let mut rx = self.log.subscribe();
        tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|log| log.len() >= n))
            .await
            .unwrap_or_else(|_| panic!("expected {n} entries, got {:?}", self.entries()))
            .expect("recorder alive")
            .to_vec()
    }

    /// Handlers that log every event kind.
    pub fn handlers(&self) -> Handlers {
        let (c, d, e, m, n, r) = (
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        );

        Handlers::new()
            .on_connect(move |_| c.push("connect".into()))
            .on_disconnect(move |info| {
                let reason = match &info.reason {
                    DisconnectReason::Requested => "requested",
                    DisconnectReason::EndpointChanged => "endpoint",
                    DisconnectReason::Lost { .. } => "lost",
                };
                d.push(format!("disconnect:{reason}"));
            })
            .on_error(move |notice| e.push(format!("error:{}", notice.kind)))
            .on_new_message(move |event| m.push(format!("message:{}", event.message.message_text)))
            .on_new_notification(move |event| {
                n.push(format!("notification:{}", event.notification.message))
            })
            .on_read_receipt(move |_| r.push("read".into()))
    }
}

// ============================================================================
// Real WebSocket Server
// ============================================================================

/// Accepts one WebSocket client on a random local port, sends `frames`,
/// then echoes every client frame back on `received` until the client
/// goes away.
pub async fn spawn_ws_server(
    frames: Vec<String>,
) -> (u16, mpsc::UnboundedReceiver<String>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let port = listener.local_addr().expect("local addr").port();
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };

        for frame in frames {
            if ws.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }

        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = tx.send(text.as_str().to_owned());
            }
        }
    });

    (port, rx, handle)
}

/// Refuses every WebSocket handshake with the given HTTP status.
pub async fn spawn_rejecting_server(status: StatusCode) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let port = listener.local_addr().expect("local addr").port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let reject = move |_request: &Request, _response: Response| {
                Err::<Response, ErrorResponse>(
                    http::Response::builder()
                        .status(status)
                        .body(None)
                        .expect("valid response"),
                )
            };
            let _ = tokio_tungstenite::accept_hdr_async(stream, reject).await;
        }
    });

    port
}
