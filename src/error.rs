//! Error types for the real-time connection layer.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Fallible API calls return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use safar_realtime::{Action, Result};
//!
//! fn mark_read(subscription: &Subscription, id: Uuid) -> Result<()> {
//!     subscription.send(Action::mark_message_read(id))?;
//!     Ok(())
//! }
//! ```
//!
//! Most errors never reach a caller at all. Transport failures are
//! absorbed by the connection manager (which schedules a reconnect),
//! decode failures are contained in the dispatcher, and handler faults
//! are contained per subscriber. Those paths log the error and, where
//! appropriate, surface an [`ErrorNotice`] to subscribers.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidEndpoint`], [`Error::Url`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::HeartbeatTimeout`], [`Error::WebSocket`] |
//! | Decode | [`Error::Decode`], [`Error::UnknownFrame`], [`Error::Json`] |
//! | Handler | [`Error::Handler`] |
//! | API | [`Error::NotConnected`], [`Error::ManagerClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::SubscriberId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when builder or options validation fails.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint is not a usable WebSocket URL.
    #[error("Invalid endpoint: {message}")]
    InvalidEndpoint {
        /// Description of the problem.
        message: String,
    },

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Transport could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Transport closed by the remote end.
    #[error("Connection closed (code={code:?}): {reason}")]
    ConnectionClosed {
        /// WebSocket close code, if one was sent.
        code: Option<u16>,
        /// Close reason sent by the server (may be empty).
        reason: String,
    },

    /// No frame arrived within the heartbeat window.
    #[error("Heartbeat timeout after {timeout_ms}ms")]
    HeartbeatTimeout {
        /// Milliseconds waited for a response.
        timeout_ms: u64,
    },

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    // ========================================================================
    // Decode Errors
    // ========================================================================
    /// Frame is not a valid envelope.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// Envelope carries a discriminant this client does not know.
    #[error("Unknown frame type: {frame_type}")]
    UnknownFrame {
        /// The unrecognized discriminant.
        frame_type: String,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Handler Errors
    // ========================================================================
    /// A subscriber callback faulted.
    #[error("Handler fault: subscriber={subscriber_id}, kind={kind}: {message}")]
    Handler {
        /// Subscriber whose callback faulted.
        subscriber_id: SubscriberId,
        /// Event kind being delivered.
        kind: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    // ========================================================================
    // API Errors
    // ========================================================================
    /// Operation requires a live connection.
    #[error("Not connected")]
    NotConnected,

    /// The connection manager task has terminated.
    #[error("Connection manager closed")]
    ManagerClosed,
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid endpoint error.
    #[inline]
    pub fn invalid_endpoint(message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a connection closed error.
    #[inline]
    pub fn connection_closed(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a heartbeat timeout error.
    #[inline]
    pub fn heartbeat_timeout(timeout_ms: u64) -> Self {
        Self::HeartbeatTimeout { timeout_ms }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an unknown frame error.
    #[inline]
    pub fn unknown_frame(frame_type: impl Into<String>) -> Self {
        Self::UnknownFrame {
            frame_type: frame_type.into(),
        }
    }

    /// Creates a handler fault error.
    #[inline]
    pub fn handler(
        subscriber_id: SubscriberId,
        kind: impl fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Self::Handler {
            subscriber_id,
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed { .. }
                | Self::HeartbeatTimeout { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a decode error.
    #[inline]
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::UnknownFrame { .. } | Self::Json(_)
        )
    }

    /// Returns `true` if this is a handler fault.
    #[inline]
    #[must_use]
    pub fn is_handler_error(&self) -> bool {
        matches!(self, Self::Handler { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::HeartbeatTimeout { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors are followed by a reconnect attempt.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_transport_error()
    }

    /// Returns the WebSocket close code carried by this error, if any.
    #[inline]
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::ConnectionClosed { code, .. } => *code,
            _ => None,
        }
    }

    /// Returns the HTTP status of a rejected WebSocket handshake, if any.
    #[inline]
    #[must_use]
    pub fn handshake_status(&self) -> Option<u16> {
        match self {
            Self::WebSocket(WsError::Http(response)) => Some(response.status().as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if the server refused the credentials, either by
    /// rejecting the handshake or by closing with
    /// [`CLOSE_CODE_UNAUTHORIZED`].
    #[inline]
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.close_code() == Some(CLOSE_CODE_UNAUTHORIZED)
            || matches!(self.handshake_status(), Some(401 | 403))
    }
}

// ============================================================================
// ErrorNotice
// ============================================================================

/// Close code the server sends when it rejects an unauthenticated socket.
pub const CLOSE_CODE_UNAUTHORIZED: u16 = 4001;

/// Classification of an error surfaced to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// Transport failed or was lost.
    Transport,
    /// Server rejected the credentials.
    Unauthorized,
    /// Server sent an `error` frame.
    Server,
    /// Reconnect attempts exhausted.
    RetriesExhausted,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transport => "transport",
            Self::Unauthorized => "unauthorized",
            Self::Server => "server",
            Self::RetriesExhausted => "retries_exhausted",
        };
        f.write_str(s)
    }
}

/// Best-effort error description delivered through `on_error`.
///
/// Carries no raw transport or protocol detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    /// What went wrong.
    pub kind: NoticeKind,
    /// Human-readable description.
    pub message: String,
}

impl ErrorNotice {
    /// Creates a new notice.
    #[inline]
    #[must_use]
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Maps an internal transport error to a notice.
    #[must_use]
    pub fn from_transport(err: &Error) -> Self {
        if err.is_unauthorized() {
            return Self::new(NoticeKind::Unauthorized, "authentication rejected");
        }

        let message = match err {
            Error::ConnectionTimeout { .. } => "connection attempt timed out",
            Error::HeartbeatTimeout { .. } => "server stopped responding",
            Error::ConnectionClosed { .. } => "connection closed by server",
            Error::Connection { .. } | Error::WebSocket(_) => "connection lost",
            _ => "connection error",
        };

        Self::new(NoticeKind::Transport, message)
    }
}

impl fmt::Display for ErrorNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

// ============================================================================
// Tests
// ============================================================================
