//! Outbound action types.
//!
//! Actions are the only frames the client sends. Every action is a JSON
//! envelope:
//!
//! ```json
//! {
//!   "action": "mark_message_read",
//!   "payload": { "message_id": "..." }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::to_string;
use uuid::Uuid;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Largest page the server will return for `get_more_messages`.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Page size used when callers don't pick one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

// ============================================================================
// Action
// ============================================================================

/// A client-to-server action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum Action {
    /// Heartbeat probe. The server answers with `pong`.
    Ping {},

    /// Mark one received message as read.
    MarkMessageRead {
        /// Message ID.
        message_id: Uuid,
    },

    /// Mark one notification as read.
    MarkNotificationRead {
        /// Notification ID.
        notification_id: Uuid,
    },

    /// Mark every notification as read.
    MarkAllNotificationsRead {},

    /// Request an older page of messages.
    GetMoreMessages {
        /// Number of messages to skip.
        offset: u32,
        /// Page size, at most [`MAX_PAGE_SIZE`].
        limit: u32,
    },
}

impl Action {
    /// Creates a heartbeat probe.
    #[inline]
    #[must_use]
    pub const fn ping() -> Self {
        Self::Ping {}
    }

    /// Creates a mark-message-read action.
    #[inline]
    #[must_use]
    pub const fn mark_message_read(message_id: Uuid) -> Self {
        Self::MarkMessageRead { message_id }
    }

    /// Creates a mark-notification-read action.
    #[inline]
    #[must_use]
    pub const fn mark_notification_read(notification_id: Uuid) -> Self {
        Self::MarkNotificationRead { notification_id }
    }

    /// Creates a mark-all-notifications-read action.
    #[inline]
    #[must_use]
    pub const fn mark_all_notifications_read() -> Self {
        Self::MarkAllNotificationsRead {}
    }

    /// Creates a pagination request. `limit` is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    #[inline]
    #[must_use]
    pub fn get_more_messages(offset: u32, limit: u32) -> Self {
        Self::GetMoreMessages {
            offset,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Returns the wire name of the action.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ping {} => "ping",
            Self::MarkMessageRead { .. } => "mark_message_read",
            Self::MarkNotificationRead { .. } => "mark_notification_read",
            Self::MarkAllNotificationsRead {} => "mark_all_notifications_read",
            Self::GetMoreMessages { .. } => "get_more_messages",
        }
    }

    /// Serializes the action to its wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
