//! Safar realtime - Reconnecting WebSocket connection layer.
//!
//! This library keeps one authenticated WebSocket connection to the
//! booking backend alive for the whole application, decodes the server's
//! event stream into typed events, fans them out to any number of
//! subscribers, and maintains a live unread counter.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  use_connection   ┌──────────────────┐
//! │  Consumers   │──────────────────►│    Realtime      │
//! │ (Handlers)   │◄──── callbacks ───│  registry/unread │
//! └──────────────┘                   └────────┬─────────┘
//!                                             │ commands
//!                                    ┌────────▼─────────┐   WebSocket
//!                                    │ ConnectionManager│◄────────────► server
//!                                    │  (tokio task)    │
//!                                    └────────┬─────────┘
//!                                             │ frames
//!                                    ┌────────▼─────────┐
//!                                    │ EventDispatcher  │
//!                                    └──────────────────┘
//! ```
//!
//! Key design principles:
//!
//! - One connection per [`Realtime`], reference counted by subscribers
//! - A single task owns the transport, so events arrive in wire order
//! - Faults in one subscriber's handler never reach another subscriber
//! - Reconnects back off exponentially with jitter, capped
//!
//! # Quick Start
//!
//! ```no_run
//! use safar_realtime::{Endpoint, Handlers, Realtime, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let realtime = Realtime::builder()
//!         .endpoint(Endpoint::new("wss://api.safar.example/ws/", "access-token")?)
//!         .build()?;
//!
//!     let subscription = realtime.use_connection(
//!         Handlers::new()
//!             .on_connect(|_| println!("connected"))
//!             .on_new_message(|event| println!("{}", event.message.preview(30))),
//!     );
//!
//!     let mut unread = subscription.unread_changes();
//!     while unread.changed().await.is_ok() {
//!         println!("unread: {}", *unread.borrow());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`dispatch`] | Event decoding and subscriber fan-out |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelopes, events and actions |
//! | [`realtime`] | The application-facing facade |
//! | [`transport`] | Connection manager and WebSocket transport |
//! | [`unread`] | Unread counter |

// ============================================================================
// Modules
// ============================================================================

/// Event decoding and subscriber fan-out.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for sessions and subscribers.
pub mod identifiers;

/// Wire protocol message types.
///
/// Inbound `{type, payload}` envelopes and outbound `{action, payload}`
/// envelopes.
pub mod protocol;

/// Application-facing facade.
///
/// Use [`Realtime::builder()`] to create a configured instance.
pub mod realtime;

/// Connection manager and WebSocket transport.
pub mod transport;

/// Unread counter.
pub mod unread;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatch::{
    Callback, DisconnectInfo, DisconnectReason, EventDispatcher, Handlers, RealtimeEvent,
    SessionInfo, SubscriberRegistry,
};
pub use error::{CLOSE_CODE_UNAUTHORIZED, Error, ErrorNotice, NoticeKind, Result};
pub use identifiers::{SessionId, SubscriberId};
pub use protocol::{
    Action, BookingUpdate, ChatMessage, DEFAULT_PAGE_SIZE, EventKind, InboundEvent, InboundFrame,
    InitialData, MAX_PAGE_SIZE, MessagePage, NewMessage, NewNotification, Notification, Pong,
    Presence, PresenceStatus, ReadReceipt, ServerError, UserSummary,
};
pub use realtime::{Realtime, RealtimeBuilder, RealtimeOptions, Subscription, WeakRealtime};
pub use transport::{
    Backoff, BackoffPolicy, ConnectionManager, ConnectionState, Connector, Endpoint, Transport,
    TransportEvent, WebSocketConnector, WebSocketTransport,
};
pub use unread::UnreadAggregator;
