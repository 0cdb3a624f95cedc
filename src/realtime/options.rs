//! Connection tuning options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use safar_realtime::{BackoffPolicy, RealtimeOptions};
//!
//! let options = RealtimeOptions::new()
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_heartbeat(Duration::from_secs(20), Duration::from_secs(5))
//!     .with_backoff(BackoffPolicy::new().with_max_delay(Duration::from_secs(60)));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::BackoffPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between heartbeat probes.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Default time allowed for any frame to arrive after a probe.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// RealtimeOptions
// ============================================================================

/// Timeouts, heartbeat, and reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealtimeOptions {
    /// Maximum time for one handshake.
    pub connect_timeout: Duration,

    /// Idle time before a heartbeat probe is sent.
    pub heartbeat_interval: Duration,

    /// Time to wait for a frame after a probe before declaring the
    /// connection dead.
    pub heartbeat_timeout: Duration,

    /// Reconnect delays.
    pub backoff: BackoffPolicy,
}

impl Default for RealtimeOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RealtimeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            backoff: BackoffPolicy::new(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RealtimeOptions {
    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets heartbeat interval and timeout.
    #[inline]
    #[must_use]
    pub const fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RealtimeOptions {
    /// Validates all settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any duration is zero or the backoff
    /// policy is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect timeout must be non-zero"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("heartbeat interval must be non-zero"));
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(Error::config("heartbeat timeout must be non-zero"));
        }
        self.backoff.validate()
    }
}

// ============================================================================
// Tests
// ============================================================================
