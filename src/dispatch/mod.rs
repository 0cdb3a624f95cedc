//! Event dispatch.
//!
//! # Flow
//!
//! ```text
//! raw frame ──► EventDispatcher::on_frame ──► InboundFrame::decode
//!                                                   │
//!                        ┌──────────────────────────┤
//!                        ▼                          ▼
//!                UnreadAggregator        SubscriberRegistry snapshot
//!                                                   │
//!                                                   ▼
//!                                   Handlers::invoke (per subscriber)
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dispatcher` | Decode, sequence, fan out |
//! | `event` | Subscriber-facing event stream types |
//! | `handlers` | Per-subscriber callback sets |
//! | `registry` | Subscriber registry |

// ============================================================================
// Submodules
// ============================================================================

/// Decode and fan-out.
pub mod dispatcher;

/// Subscriber-facing event types.
pub mod event;

/// Callback sets.
pub mod handlers;

/// Subscriber registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::EventDispatcher;
pub use event::{DisconnectInfo, DisconnectReason, RealtimeEvent, SessionInfo};
pub use handlers::{Callback, Handlers};
pub use registry::SubscriberRegistry;
