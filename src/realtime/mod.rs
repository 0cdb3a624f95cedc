//! Application-facing facade.
//!
//! # Example
//!
//! ```no_run
//! use safar_realtime::{Endpoint, Handlers, Realtime};
//!
//! # async fn example() -> safar_realtime::Result<()> {
//! let realtime = Realtime::builder()
//!     .endpoint(Endpoint::new("wss://api.safar.example/ws/", "access-token")?)
//!     .build()?;
//!
//! let inbox = realtime.use_connection(
//!     Handlers::new()
//!         .on_connect(|info| println!("connected: {}", info.session_id))
//!         .on_new_notification(|event| println!("{}", event.notification.message)),
//! );
//!
//! // Dropping the last subscription closes the connection.
//! drop(inbox);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Facade configuration |
//! | `core` | The [`Realtime`] handle |
//! | `options` | Timeouts, heartbeat, reconnect policy |
//! | `subscription` | Per-consumer registration guard |

// ============================================================================
// Submodules
// ============================================================================

/// Facade builder.
pub mod builder;

/// Realtime handle.
pub mod core;

/// Tuning options.
pub mod options;

/// Subscription guard.
pub mod subscription;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::RealtimeBuilder;
pub use core::{Realtime, WeakRealtime};
pub use options::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT,
    RealtimeOptions,
};
pub use subscription::Subscription;
