//! WebSocket transport layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                        ┌─────────────────┐
//! │  ConnectionManager   │       WebSocket        │  Booking API    │
//! │  (tokio task)        │◄──────────────────────►│  /ws/?token=…   │
//! │  Transport + state   │   JSON envelopes       │                 │
//! └──────────────────────┘                        └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionManager::connect` - Start a handshake via the [`Connector`]
//! 2. `connected` - Frames flow to the dispatcher, heartbeat runs
//! 3. Transport failure - Back off per [`BackoffPolicy`], then reconnect
//! 4. `ConnectionManager::disconnect` - Close and stop reconnecting
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnect delay policy |
//! | `connection` | Transport traits and the WebSocket implementation |
//! | `endpoint` | URL and credential pair |
//! | `manager` | Connection state machine task |
//! | `state` | Published connection state |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect backoff.
pub mod backoff;

/// Transport seam and WebSocket implementation.
pub mod connection;

/// Endpoint identity.
pub mod endpoint;

/// Connection manager task.
pub mod manager;

/// Connection state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::{Backoff, BackoffPolicy};
pub use connection::{Connector, Transport, TransportEvent, WebSocketConnector, WebSocketTransport};
pub use endpoint::Endpoint;
pub use manager::ConnectionManager;
pub use state::ConnectionState;
