//! Inbound frame types.
//!
//! Frames are pushed by the server over the persistent connection. Every
//! frame is a JSON envelope:
//!
//! ```json
//! {
//!   "type": "new_message",
//!   "payload": { ... }
//! }
//! ```
//!
//! # Frame Types
//!
//! | Discriminant | Decodes to |
//! |--------------|------------|
//! | `new_message` / `message` | [`InboundEvent::Message`] |
//! | `new_notification` / `notification` | [`InboundEvent::Notification`] |
//! | `error` | [`InboundEvent::Error`] |
//! | `presence` | [`InboundEvent::Presence`] |
//! | `initial_data` | [`InboundEvent::InitialData`] |
//! | `booking_update` | [`InboundEvent::BookingUpdate`] |
//! | `message_marked_read` | [`InboundEvent::ReadReceipt`] |
//! | `notification_marked_read` | [`InboundEvent::ReadReceipt`] |
//! | `all_notifications_marked_read` | [`InboundEvent::ReadReceipt`] |
//! | `more_messages` | [`InboundEvent::MoreMessages`] |
//! | `pong` | [`InboundFrame::Pong`] (heartbeat only) |
//!
//! Any other discriminant is rejected with [`Error::UnknownFrame`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, from_str, from_value};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Envelope
// ============================================================================

/// Undecoded envelope: discriminant plus raw payload.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    /// Frame discriminant.
    #[serde(rename = "type")]
    frame_type: String,

    /// Frame payload (absent payloads decode as `{}`).
    #[serde(default)]
    payload: Value,
}

// ============================================================================
// InboundFrame
// ============================================================================

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Domain event destined for subscribers.
    Event(InboundEvent),
    /// Heartbeat response. Consumed by liveness tracking only.
    Pong(Pong),
}

impl InboundFrame {
    /// Decodes a raw text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not a JSON envelope
    /// - [`Error::UnknownFrame`] if the discriminant is not recognized
    /// - [`Error::Decode`] if the payload does not match its variant
    pub fn decode(text: &str) -> Result<Self> {
        let raw: RawEnvelope = from_str(text)?;
        let RawEnvelope {
            frame_type,
            payload,
        } = raw;

        let payload = match payload {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let event = match frame_type.as_str() {
            "new_message" | "message" => InboundEvent::Message(payload_as(&frame_type, payload)?),
            "new_notification" | "notification" => {
                InboundEvent::Notification(payload_as(&frame_type, payload)?)
            }
            "error" => InboundEvent::Error(payload_as(&frame_type, payload)?),
            "presence" => InboundEvent::Presence(payload_as(&frame_type, payload)?),
            "initial_data" => InboundEvent::InitialData(payload_as(&frame_type, payload)?),
            "booking_update" => InboundEvent::BookingUpdate(payload_as(&frame_type, payload)?),
            "message_marked_read" => {
                let ack: MessageAck = payload_as(&frame_type, payload)?;
                InboundEvent::ReadReceipt(ReadReceipt::Message {
                    message_id: ack.message_id,
                })
            }
            "notification_marked_read" => {
                let ack: NotificationAck = payload_as(&frame_type, payload)?;
                InboundEvent::ReadReceipt(ReadReceipt::Notification {
                    notification_id: ack.notification_id,
                })
            }
            "all_notifications_marked_read" => {
                let ack: BulkAck = payload_as(&frame_type, payload)?;
                InboundEvent::ReadReceipt(ReadReceipt::AllNotifications { count: ack.count })
            }
            "more_messages" => InboundEvent::MoreMessages(payload_as(&frame_type, payload)?),
            "pong" => return Ok(Self::Pong(payload_as(&frame_type, payload)?)),
            _ => return Err(Error::unknown_frame(frame_type)),
        };

        Ok(Self::Event(event))
    }
}

/// Decodes a payload into its typed shape, tagging failures with the
/// frame discriminant.
fn payload_as<T: DeserializeOwned>(frame_type: &str, payload: Value) -> Result<T> {
    from_value(payload).map_err(|e| Error::decode(format!("{frame_type}: {e}")))
}

// ============================================================================
// InboundEvent
// ============================================================================

/// Typed domain event delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// New chat message.
    Message(NewMessage),
    /// New notification.
    Notification(NewNotification),
    /// Server-reported error.
    Error(ServerError),
    /// Presence change for another user.
    Presence(Presence),
    /// Snapshot sent right after the server accepts the socket.
    InitialData(InitialData),
    /// Booking changed server-side.
    BookingUpdate(BookingUpdate),
    /// Server confirmed a mark-as-read action.
    ReadReceipt(ReadReceipt),
    /// Page of older messages.
    MoreMessages(MessagePage),
}

impl InboundEvent {
    /// Returns the kind of this event.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Notification(_) => EventKind::Notification,
            Self::Error(_) => EventKind::Error,
            Self::Presence(_) => EventKind::Presence,
            Self::InitialData(_) => EventKind::InitialData,
            Self::BookingUpdate(_) => EventKind::BookingUpdate,
            Self::ReadReceipt(_) => EventKind::ReadReceipt,
            Self::MoreMessages(_) => EventKind::MoreMessages,
        }
    }
}

// ============================================================================
// EventKind
// ============================================================================

/// Discriminant of everything a subscriber can be called for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Session established.
    Connect,
    /// Session ended.
    Disconnect,
    /// Transport failure or server error.
    Error,
    /// New chat message.
    Message,
    /// New notification.
    Notification,
    /// Presence change.
    Presence,
    /// Initial snapshot.
    InitialData,
    /// Booking update.
    BookingUpdate,
    /// Read receipt.
    ReadReceipt,
    /// Message page.
    MoreMessages,
}

impl EventKind {
    /// Returns `true` for kinds that count towards the unread total.
    #[inline]
    #[must_use]
    pub const fn is_unread(&self) -> bool {
        matches!(self, Self::Message | Self::Notification)
    }

    /// Returns the wire-style name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Error => "error",
            Self::Message => "message",
            Self::Notification => "notification",
            Self::Presence => "presence",
            Self::InitialData => "initial_data",
            Self::BookingUpdate => "booking_update",
            Self::ReadReceipt => "read_receipt",
            Self::MoreMessages => "more_messages",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Public profile fields of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// User ID.
    pub id: Uuid,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default)]
    pub last_name: String,
}

impl UserSummary {
    /// Returns "First Last", trimmed.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message ID.
    pub id: Uuid,
    /// Author.
    pub sender: UserSummary,
    /// Message body.
    pub message_text: String,
    /// Whether the receiver has read it.
    #[serde(default)]
    pub is_read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Returns the body truncated to `max_chars`, with `...` appended
    /// when something was cut.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.message_text.chars();
        let head: String = chars.by_ref().take(max_chars).collect();

        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

/// Payload of a `new_message` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// The message.
    pub message: ChatMessage,
}

/// A notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID.
    pub id: Uuid,
    /// Notification text.
    pub message: String,
    /// Notification category (booking, payment, ...).
    #[serde(default, rename = "type")]
    pub notification_type: Option<String>,
    /// ID of the entity the notification points at.
    #[serde(default)]
    pub target_id: Option<String>,
    /// Whether it was read already.
    #[serde(default)]
    pub is_read: bool,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload of a `new_notification` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    /// The notification.
    pub notification: Notification,
}

/// Payload of an `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error text from the server.
    pub message: String,
}

/// Online status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// User is online.
    Online,
    /// User is idle.
    Away,
    /// User went offline.
    Offline,
}

/// Payload of a `presence` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// User whose presence changed.
    pub user_id: Uuid,
    /// New status.
    pub status: PresenceStatus,
    /// Last activity time.
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Payload of an `initial_data` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialData {
    /// Recent bookings, schema owned by the REST layer.
    #[serde(default)]
    pub bookings: Vec<Value>,
    /// Recent messages, newest first.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Unread notifications, newest first.
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

/// Payload of a `booking_update` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingUpdate {
    /// Booking ID, if the server included one.
    #[serde(default)]
    pub booking_id: Option<Uuid>,
    /// New booking status.
    #[serde(default)]
    pub status: Option<String>,
    /// Remaining fields, schema owned by the REST layer.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Server confirmation of a mark-as-read action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadReceipt {
    /// One message marked read.
    Message {
        /// Message ID.
        message_id: Uuid,
    },
    /// One notification marked read.
    Notification {
        /// Notification ID.
        notification_id: Uuid,
    },
    /// All notifications marked read.
    AllNotifications {
        /// Number of notifications affected.
        count: u64,
    },
}

/// Payload of a `more_messages` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Messages in this page, newest first.
    pub messages: Vec<ChatMessage>,
    /// Page offset.
    pub offset: u32,
    /// Page size.
    pub limit: u32,
}

/// Payload of a `pong` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Server time, ISO-8601 without offset.
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageAck {
    message_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct NotificationAck {
    notification_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct BulkAck {
    #[serde(default)]
    count: u64,
}

// ============================================================================
// Tests
// ============================================================================
