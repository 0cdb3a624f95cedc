//! Realtime facade.
//!
//! [`Realtime`] ties the connection manager, the event dispatcher, the
//! subscriber registry, and the unread counter together behind one
//! handle. Consumers only ever call [`Realtime::use_connection`].
//!
//! The connection is reference counted by subscribers: the first
//! registration connects, dropping the last [`Subscription`] disconnects.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::dispatch::{EventDispatcher, Handlers, SubscriberRegistry};
use crate::error::Result;
use crate::identifiers::SubscriberId;
use crate::protocol::Action;
use crate::transport::{ConnectionManager, ConnectionState, Connector, Endpoint};
use crate::unread::UnreadAggregator;

use super::builder::RealtimeBuilder;
use super::options::RealtimeOptions;
use super::subscription::Subscription;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the facade.
pub(crate) struct RealtimeInner {
    /// Handle to the connection manager task.
    manager: ConnectionManager,

    /// Decoder and fan-out (kept for sequence inspection).
    dispatcher: Arc<EventDispatcher>,

    /// Registered subscribers.
    registry: Arc<SubscriberRegistry>,

    /// Unread counter.
    unread: Arc<UnreadAggregator>,

    /// Current endpoint. Also serializes register/deregister so connect
    /// and disconnect commands reach the manager in refcount order.
    endpoint: Mutex<Endpoint>,
}

impl Drop for RealtimeInner {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}

// ============================================================================
// Realtime
// ============================================================================

/// Shared real-time connection for the whole application.
///
/// Cheap to clone. Every clone talks to the same connection, the same
/// subscriber set, and the same unread counter.
///
/// # Example
///
/// ```no_run
/// use safar_realtime::{Endpoint, Handlers, Realtime};
///
/// # async fn example() -> safar_realtime::Result<()> {
/// let realtime = Realtime::builder()
///     .endpoint(Endpoint::new("wss://api.safar.example/ws/", "access-token")?)
///     .build()?;
///
/// let subscription = realtime.use_connection(
///     Handlers::new().on_new_message(|event| {
///         println!("{}", event.message.preview(30));
///     }),
/// );
///
/// println!("{} / {}", subscription.connection_state(), subscription.unread_count());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Realtime {
    /// Shared inner state.
    pub(crate) inner: Arc<RealtimeInner>,
}

/// Non-owning handle to a [`Realtime`], safe to capture in handlers.
#[derive(Clone, Debug)]
pub struct WeakRealtime {
    inner: Weak<RealtimeInner>,
}

impl WeakRealtime {
    /// Returns the facade if any strong handle is still alive.
    #[inline]
    #[must_use]
    pub fn upgrade(&self) -> Option<Realtime> {
        self.inner.upgrade().map(|inner| Realtime { inner })
    }
}

// ============================================================================
// Realtime - Display
// ============================================================================

impl fmt::Debug for Realtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realtime")
            .field("endpoint", &*self.inner.endpoint.lock())
            .field("state", &self.connection_state())
            .field("subscribers", &self.subscriber_count())
            .field("unread", &self.unread_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Realtime - Construction
// ============================================================================

impl Realtime {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> RealtimeBuilder {
        RealtimeBuilder::new()
    }

    /// Wires the components together and spawns the manager task.
    pub(crate) fn new(
        endpoint: Endpoint,
        options: RealtimeOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let unread = Arc::new(UnreadAggregator::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&unread),
        ));
        let manager = ConnectionManager::spawn(connector, Arc::clone(&dispatcher), options);

        debug!(endpoint = %endpoint, "Realtime facade created");

        Self {
            inner: Arc::new(RealtimeInner {
                manager,
                dispatcher,
                registry,
                unread,
                endpoint: Mutex::new(endpoint),
            }),
        }
    }
}

// ============================================================================
// Realtime - Public API
// ============================================================================

impl Realtime {
    /// Returns a non-owning handle to this facade.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakRealtime {
        WeakRealtime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers a handler set and returns its subscription.
    ///
    /// Registering makes sure the shared connection is up (or on its way
    /// up). The handlers stay registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    ///
    /// Handlers that need the facade should capture a
    /// [`WeakRealtime`] from [`Realtime::downgrade`]. A strong clone held
    /// by a handler (or a handler holding its own [`Subscription`]) keeps
    /// the facade alive through the registry, and the connection is then
    /// never shut down.
    #[must_use = "dropping the subscription deregisters its handlers"]
    pub fn use_connection(&self, handlers: Handlers) -> Subscription {
        let id = self.register(handlers);
        Subscription::new(self.clone(), id)
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.manager.state()
    }

    /// Returns a receiver that observes every connection state change.
    #[inline]
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.manager.subscribe_state()
    }

    /// Returns the current unread count.
    #[inline]
    #[must_use]
    pub fn unread_count(&self) -> u64 {
        self.inner.unread.count()
    }

    /// Returns a receiver that observes every unread count change.
    #[inline]
    #[must_use]
    pub fn unread_changes(&self) -> watch::Receiver<u64> {
        self.inner.unread.subscribe()
    }

    /// Resets the unread count to zero.
    pub fn acknowledge(&self) {
        self.inner.unread.acknowledge();
    }

    /// Lowers the unread count by one, saturating at zero.
    pub fn acknowledge_one(&self) {
        self.inner.unread.acknowledge_one();
    }

    /// Sends an action to the server.
    ///
    /// Actions are never queued: a send while not connected fails.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`](crate::Error::NotConnected) if not connected
    /// - [`Error::ManagerClosed`](crate::Error::ManagerClosed) after shutdown
    pub fn send(&self, action: Action) -> Result<()> {
        self.inner.manager.send(action)
    }

    /// Replaces the endpoint identity, typically after a token refresh.
    ///
    /// While subscribers exist, a different endpoint moves the connection
    /// over. The unread count is kept; callers that switch to another user
    /// call [`Realtime::acknowledge`] themselves. Setting the current
    /// endpoint again is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::ManagerClosed`](crate::Error::ManagerClosed) after shutdown.
    pub fn set_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        let mut current = self.inner.endpoint.lock();
        if *current == endpoint {
            return Ok(());
        }

        info!(endpoint = %endpoint, "Endpoint changed");
        *current = endpoint.clone();

        if self.inner.registry.is_empty() {
            return Ok(());
        }
        self.inner.manager.connect(endpoint)
    }

    /// Returns a copy of the current endpoint.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.inner.endpoint.lock().clone()
    }

    /// Returns the number of registered subscribers.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Returns the sequence number of the last dispatched event.
    #[inline]
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.inner.dispatcher.sequence()
    }

    /// Closes the connection and stops the manager task.
    ///
    /// Existing subscriptions stay valid but will never see another event.
    pub fn shutdown(&self) {
        info!("Realtime shutdown requested");
        self.inner.manager.shutdown();
    }
}

// ============================================================================
// Realtime - Registration
// ============================================================================

impl Realtime {
    pub(crate) fn register(&self, handlers: Handlers) -> SubscriberId {
        let endpoint = self.inner.endpoint.lock();
        let id = SubscriberId::next();

        self.inner.registry.insert(id, handlers);
        debug!(subscriber_id = %id, total = self.inner.registry.len(), "Subscriber registered");

        // Connect is idempotent, so every registration re-asserts the
        // connection. This also restarts a manager that gave up.
        if let Err(e) = self.inner.manager.connect(endpoint.clone()) {
            warn!(subscriber_id = %id, error = %e, "Cannot connect, manager is closed");
        }

        id
    }

    pub(crate) fn deregister(&self, id: SubscriberId) {
        let _endpoint = self.inner.endpoint.lock();

        if !self.inner.registry.remove(id) {
            return;
        }
        debug!(subscriber_id = %id, total = self.inner.registry.len(), "Subscriber removed");

        if self.inner.registry.is_empty() {
            info!("Last subscriber gone, disconnecting");
            if let Err(e) = self.inner.manager.disconnect() {
                debug!(error = %e, "Disconnect skipped, manager is closed");
            }
        }
    }

    pub(crate) fn replace_handlers(&self, id: SubscriberId, handlers: Handlers) -> bool {
        self.inner.registry.replace(id, handlers)
    }

    #[cfg(test)]
    pub(crate) fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }
}

// ============================================================================
// Tests
// ============================================================================
