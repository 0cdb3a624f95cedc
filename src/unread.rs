//! Unread counter.
//!
//! Counts message and notification events dispatched during the active
//! session. Only the consuming surface lowers the count, via
//! [`UnreadAggregator::acknowledge`]. Connection loss never touches it.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::watch;
use tracing::debug;

use crate::protocol::EventKind;

// ============================================================================
// UnreadAggregator
// ============================================================================

/// Running count of unseen messages and notifications.
///
/// Readers observe the count through [`UnreadAggregator::count`] or a
/// reactive [`watch::Receiver`] from [`UnreadAggregator::subscribe`].
#[derive(Debug)]
pub struct UnreadAggregator {
    count: watch::Sender<u64>,
}

impl Default for UnreadAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl UnreadAggregator {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    /// Returns the current count.
    #[inline]
    #[must_use]
    pub fn count(&self) -> u64 {
        *self.count.borrow()
    }

    /// Returns a receiver that observes every change.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.count.subscribe()
    }

    /// Counts one dispatched event.
    ///
    /// Returns `true` if the count changed (message and notification
    /// kinds only).
    pub fn record_event(&self, kind: EventKind) -> bool {
        if !kind.is_unread() {
            return false;
        }

        self.count.send_modify(|count| *count = count.saturating_add(1));
        true
    }

    /// Resets the count to zero. Idempotent.
    pub fn acknowledge(&self) {
        let changed = self.count.send_if_modified(|count| {
            let was = *count;
            *count = 0;
            was != 0
        });

        if changed {
            debug!("Unread count acknowledged");
        }
    }

    /// Lowers the count by one for a single item the consumer viewed.
    /// Saturates at zero.
    pub fn acknowledge_one(&self) {
        self.count.send_if_modified(|count| {
            if *count == 0 {
                return false;
            }
            *count -= 1;
            true
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
