//! Builder pattern for facade configuration.
//!
//! Provides a fluent API for configuring and creating [`Realtime`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use safar_realtime::{Endpoint, Realtime};
//!
//! # async fn example() -> safar_realtime::Result<()> {
//! let realtime = Realtime::builder()
//!     .endpoint(Endpoint::new("wss://api.safar.example/ws/", "access-token")?)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::transport::{Connector, Endpoint, WebSocketConnector};

use super::core::Realtime;
use super::options::RealtimeOptions;

// ============================================================================
// RealtimeBuilder
// ============================================================================

/// Builder for configuring a [`Realtime`] instance.
///
/// Use [`Realtime::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct RealtimeBuilder {
    /// Endpoint identity.
    endpoint: Option<Endpoint>,
    /// Tuning options.
    options: RealtimeOptions,
    /// Transport factory (WebSocket when unset).
    connector: Option<Arc<dyn Connector>>,
}

// ============================================================================
// RealtimeBuilder Implementation
// ============================================================================

impl RealtimeBuilder {
    /// Creates a builder with default options and no endpoint.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint to connect to.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets tuning options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: RealtimeOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the transport factory.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Builds the facade and spawns its connection manager.
    ///
    /// No connection is opened until the first subscriber registers.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoint is set
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Config`] if called outside a Tokio runtime
    pub fn build(self) -> Result<Realtime> {
        let endpoint = self.endpoint.ok_or_else(|| {
            Error::config(
                "Endpoint is required. Use .endpoint() to set it.\n\
                 Example: Realtime::builder().endpoint(Endpoint::new(url, token)?)",
            )
        })?;

        self.options.validate()?;

        if Handle::try_current().is_err() {
            return Err(Error::config(
                "Realtime::build() must be called from within a Tokio runtime",
            ));
        }

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WebSocketConnector::new()),
        };

        Ok(Realtime::new(endpoint, self.options, connector))
    }
}

impl fmt::Debug for RealtimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeBuilder")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_missing_endpoint() {
        let err = RealtimeBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("Endpoint is required"));
    }

    #[test]
    fn test_requires_runtime() {
        let endpoint = Endpoint::anonymous("ws://localhost:8000/ws/").expect("valid");
        let err = RealtimeBuilder::new().endpoint(endpoint).build().unwrap_err();
        assert!(err.to_string().contains("Tokio runtime"));
    }

    #[tokio::test]
    async fn test_invalid_options() {
        let endpoint = Endpoint::anonymous("ws://localhost:8000/ws/").expect("valid");
        let result = RealtimeBuilder::new()
            .endpoint(endpoint)
            .options(RealtimeOptions::new().with_connect_timeout(Duration::ZERO))
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_build_starts_disconnected() {
        let endpoint = Endpoint::anonymous("ws://localhost:8000/ws/").expect("valid");
        let realtime = RealtimeBuilder::new()
            .endpoint(endpoint)
            .build()
            .expect("build");

        assert_eq!(realtime.connection_state(), crate::ConnectionState::Disconnected);
        assert_eq!(realtime.subscriber_count(), 0);
    }

    #[test]
    fn test_debug_hides_token() {
        let endpoint = Endpoint::new("ws://localhost:8000/ws/", "hunter2").expect("valid");
        let builder = RealtimeBuilder::new().endpoint(endpoint);
        assert!(!format!("{builder:?}").contains("hunter2"));
    }
}
