//! Events as seen by subscribers.
//!
//! [`RealtimeEvent`] merges connection lifecycle notifications with the
//! decoded inbound events, so one ordered stream carries both.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{ErrorNotice, NoticeKind};
use crate::identifiers::SessionId;
use crate::protocol::{EventKind, InboundEvent};

// ============================================================================
// Lifecycle Payloads
// ============================================================================

/// Passed to `on_connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// The new session.
    pub session_id: SessionId,
    /// Server URL, without credentials.
    pub url: String,
    /// Failed attempts that preceded this connect.
    pub retries: u32,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Caller asked for it (`disconnect()`, last subscriber left, shutdown).
    Requested,
    /// Endpoint was rotated. A new session follows.
    EndpointChanged,
    /// Transport failed or the server closed it.
    Lost {
        /// Short description, safe to display.
        description: String,
    },
}

/// Passed to `on_disconnect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectInfo {
    /// The session that ended.
    pub session_id: SessionId,
    /// Why it ended.
    pub reason: DisconnectReason,
    /// Whether the manager will try again on its own.
    pub will_reconnect: bool,
}

// ============================================================================
// RealtimeEvent
// ============================================================================

/// One entry in the ordered stream delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// A session was established.
    Connected(SessionInfo),
    /// A session ended.
    Disconnected(DisconnectInfo),
    /// Transport failure or server-reported error.
    Error(ErrorNotice),
    /// Decoded domain event.
    Inbound(InboundEvent),
}

impl RealtimeEvent {
    /// Wraps a decoded event. Server `error` frames become
    /// [`RealtimeEvent::Error`] so every error reaches `on_error` in the
    /// same shape.
    #[must_use]
    pub fn from_inbound(event: InboundEvent) -> Self {
        match event {
            InboundEvent::Error(err) => {
                Self::Error(ErrorNotice::new(NoticeKind::Server, err.message))
            }
            other => Self::Inbound(other),
        }
    }

    /// Returns the kind, used for handler lookup and unread accounting.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected(_) => EventKind::Connect,
            Self::Disconnected(_) => EventKind::Disconnect,
            Self::Error(_) => EventKind::Error,
            Self::Inbound(event) => event.kind(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::ServerError;

    #[test]
    fn test_server_error_becomes_notice() {
        let event = RealtimeEvent::from_inbound(InboundEvent::Error(ServerError {
            message: "Message ID is required".into(),
        }));

        assert_eq!(
            event,
            RealtimeEvent::Error(ErrorNotice::new(
                NoticeKind::Server,
                "Message ID is required"
            ))
        );
        assert_eq!(event.kind(), EventKind::Error);
    }

    #[test]
    fn test_lifecycle_kinds() {
        let connected = RealtimeEvent::Connected(SessionInfo {
            session_id: SessionId::new(1),
            url: "ws://localhost/ws/".into(),
            retries: 0,
        });
        let disconnected = RealtimeEvent::Disconnected(DisconnectInfo {
            session_id: SessionId::new(1),
            reason: DisconnectReason::Requested,
            will_reconnect: false,
        });

        assert_eq!(connected.kind(), EventKind::Connect);
        assert_eq!(disconnected.kind(), EventKind::Disconnect);
    }
}
