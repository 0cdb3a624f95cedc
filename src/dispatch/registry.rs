//! Subscriber registry.
//!
//! Maps subscriber tokens to their current handler sets. Iteration order
//! is registration order, since [`SubscriberId`]s are allocated
//! monotonically.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::identifiers::SubscriberId;

use super::handlers::Handlers;

// ============================================================================
// SubscriberRegistry
// ============================================================================

/// Registry of mounted consumers.
///
/// Register, replace, and remove are keyed by subscriber identity and are
/// individually idempotent, so repeated or out-of-order calls from
/// independent callers can't corrupt it.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    entries: RwLock<BTreeMap<SubscriberId, Arc<Handlers>>>,
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id`. Returns `false` (and changes nothing) if `id` is
    /// already registered.
    pub fn insert(&self, id: SubscriberId, handlers: Handlers) -> bool {
        let mut entries = self.entries.write();

        if entries.contains_key(&id) {
            return false;
        }

        entries.insert(id, Arc::new(handlers));
        true
    }

    /// Swaps the handlers of a registered subscriber in place. Returns
    /// `false` if `id` is not registered.
    pub fn replace(&self, id: SubscriberId, handlers: Handlers) -> bool {
        match self.entries.write().get_mut(&id) {
            Some(slot) => {
                *slot = Arc::new(handlers);
                true
            }
            None => false,
        }
    }

    /// Removes `id`. Returns `false` if it was not registered.
    pub fn remove(&self, id: SubscriberId) -> bool {
        self.entries.write().remove(&id).is_some()
    }

    /// Returns `true` if `id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Returns the number of registered subscribers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nobody is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copies out the current subscribers in registration order.
    ///
    /// Dispatch works on the copy, so handlers may register or
    /// deregister while they run.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(SubscriberId, Arc<Handlers>)> {
        self.entries
            .read()
            .iter()
            .map(|(id, handlers)| (*id, Arc::clone(handlers)))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
