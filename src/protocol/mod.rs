//! Wire protocol message types.
//!
//! This module defines the message format exchanged with the real-time
//! server.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `InboundFrame` | Server → Client | Domain events and heartbeat replies |
//! | `Action` | Client → Server | Heartbeat probes and read acknowledgements |
//!
//! Inbound frames are `{"type", "payload"}` envelopes; outbound actions
//! are `{"action", "payload"}` envelopes.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Outbound action envelope |
//! | `event` | Inbound frame envelope and payload types |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound action definitions.
pub mod action;

/// Inbound frame and payload types.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::{Action, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use event::{
    BookingUpdate, ChatMessage, EventKind, InboundEvent, InboundFrame, InitialData, MessagePage,
    NewMessage, NewNotification, Notification, Pong, Presence, PresenceStatus, ReadReceipt,
    ServerError, UserSummary,
};
