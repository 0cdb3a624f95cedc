//! Transport seam and the WebSocket implementation.
//!
//! The connection manager never touches sockets directly. It asks a
//! [`Connector`] for a [`Transport`] and then drives that transport from
//! its own task. [`WebSocketConnector`] is the production connector;
//! tests plug in scripted ones.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::Endpoint;

// ============================================================================
// Types
// ============================================================================

/// Something that happened on a live transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame (one protocol envelope).
    Text(String),
    /// Transport-level pong. Counts as liveness.
    Pong,
    /// Remote end closed the transport.
    Closed {
        /// Close code, if one was sent.
        code: Option<u16>,
        /// Close reason (may be empty).
        reason: String,
    },
}

/// A live bidirectional transport.
///
/// Owned and driven by exactly one connection manager task.
#[async_trait]
pub trait Transport: Send {
    /// Sends one text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Waits for the next event.
    ///
    /// Must be cancel-safe: the manager polls it inside `select!`.
    async fn next_event(&mut self) -> Result<TransportEvent>;

    /// Closes the transport. Errors are ignored.
    async fn close(&mut self);
}

/// Establishes transports for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a transport. The future is dropped if the caller gives up,
    /// which must abort the attempt.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>>;
}

// ============================================================================
// WebSocketConnector
// ============================================================================

/// Connector for `ws://` and `wss://` endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Creates a new connector.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>> {
        let url = endpoint.connect_url();

        // A rejected handshake keeps its HTTP status inside the error.
        let (stream, response) = connect_async(url.as_str()).await.map_err(|e| {
            debug!(endpoint = %endpoint, error = %e, "WebSocket handshake failed");
            Error::WebSocket(e)
        })?;

        debug!(
            endpoint = %endpoint,
            status = response.status().as_u16(),
            "WebSocket handshake completed"
        );

        Ok(Box::new(WebSocketTransport { stream }))
    }
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// [`Transport`] over a tungstenite WebSocket stream.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<TransportEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(TransportEvent::Text(text.as_str().to_owned()));
                }

                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Ok(TransportEvent::Text(text)),
                    Err(_) => warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                },

                Some(Ok(Message::Pong(_))) => return Ok(TransportEvent::Pong),

                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.as_str().to_owned()))
                        .unwrap_or_default();
                    debug!(?code, %reason, "WebSocket closed by remote");
                    return Ok(TransportEvent::Closed { code, reason });
                }

                Some(Err(e)) => return Err(Error::WebSocket(e)),

                None => {
                    debug!("WebSocket stream ended");
                    return Ok(TransportEvent::Closed {
                        code: None,
                        reason: String::new(),
                    });
                }

                // Pings are answered by tungstenite.
                Some(Ok(_)) => trace!("Ignoring control frame"),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            trace!(error = %e, "Close after failure");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let endpoint =
            Endpoint::anonymous(&format!("ws://127.0.0.1:{port}/ws/")).expect("valid endpoint");
        let err = WebSocketConnector::new()
            .connect(&endpoint)
            .await
            .err()
            .expect("connect should fail");

        assert!(err.is_transport_error());
    }
}
