//! Subscription handle returned by [`Realtime::use_connection`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::watch;

use crate::dispatch::Handlers;
use crate::error::Result;
use crate::identifiers::SubscriberId;
use crate::protocol::Action;
use crate::transport::ConnectionState;

use super::core::Realtime;

// ============================================================================
// Subscription
// ============================================================================

/// One consumer's registration with the shared connection.
///
/// Exposes the live connection state and unread count. Dropping it
/// deregisters the handlers; dropping the last subscription closes the
/// connection.
pub struct Subscription {
    /// Facade this subscription belongs to.
    realtime: Realtime,
    /// Registry key.
    id: SubscriberId,
    /// `false` once unsubscribed.
    active: bool,
}

impl Subscription {
    pub(crate) fn new(realtime: Realtime, id: SubscriberId) -> Self {
        Self {
            realtime,
            id,
            active: true,
        }
    }

    /// Returns the subscriber ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Returns `true` until [`Subscription::unsubscribe`] is called.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.realtime.connection_state()
    }

    /// Returns the current unread count.
    #[inline]
    #[must_use]
    pub fn unread_count(&self) -> u64 {
        self.realtime.unread_count()
    }

    /// Returns a receiver that observes connection state changes.
    #[inline]
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.realtime.state_changes()
    }

    /// Returns a receiver that observes unread count changes.
    #[inline]
    #[must_use]
    pub fn unread_changes(&self) -> watch::Receiver<u64> {
        self.realtime.unread_changes()
    }

    /// Resets the shared unread count to zero.
    pub fn acknowledge(&self) {
        self.realtime.acknowledge();
    }

    /// Sends an action to the server.
    ///
    /// # Errors
    ///
    /// See [`Realtime::send`].
    pub fn send(&self, action: Action) -> Result<()> {
        self.realtime.send(action)
    }

    /// Swaps this subscriber's handler set in place.
    ///
    /// Keeps the registration (and its position in dispatch order).
    /// Returns `false` if already unsubscribed.
    pub fn update_handlers(&self, handlers: Handlers) -> bool {
        self.active && self.realtime.replace_handlers(self.id, handlers)
    }

    /// Deregisters the handlers. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.realtime.deregister(self.id);
    }

    /// Returns the facade this subscription belongs to.
    #[inline]
    #[must_use]
    pub fn realtime(&self) -> &Realtime {
        &self.realtime
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::dispatch::RealtimeEvent;
    use crate::error::{ErrorNotice, NoticeKind};
    use crate::transport::{Connector, Endpoint, Transport};

    struct StalledConnector;

    #[async_trait]
    impl Connector for StalledConnector {
        async fn connect(&self, _endpoint: &Endpoint) -> Result<Box<dyn Transport>> {
            std::future::pending().await
        }
    }

    fn realtime() -> Realtime {
        Realtime::builder()
            .endpoint(Endpoint::anonymous("ws://localhost:8000/ws/").expect("valid"))
            .connector(StalledConnector)
            .build()
            .expect("build")
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let realtime = realtime();
        let mut sub = realtime.use_connection(Handlers::new());
        let _other = realtime.use_connection(Handlers::new());
        assert_eq!(realtime.subscriber_count(), 2);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(realtime.subscriber_count(), 1);

        drop(sub);
        assert_eq!(realtime.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_ids_are_distinct() {
        let realtime = realtime();
        let a = realtime.use_connection(Handlers::new());
        let b = realtime.use_connection(Handlers::new());
        assert_ne!(a.id(), b.id());
        assert!(a.id() < b.id());
    }

    #[tokio::test]
    async fn test_update_handlers() {
        let realtime = realtime();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut sub = realtime.use_connection(Handlers::new());
        assert!(sub.update_handlers(
            Handlers::new().on_error(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        ));

        let notice = ErrorNotice::new(NoticeKind::Transport, "connection lost");
        realtime.dispatcher().dispatch(&RealtimeEvent::Error(notice));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        assert!(!sub.update_handlers(Handlers::new()));
    }
}
