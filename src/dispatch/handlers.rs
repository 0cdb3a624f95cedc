//! Subscriber handler sets.
//!
//! A [`Handlers`] value maps each event kind to an ordered list of
//! callbacks. Every slot is optional; a subscriber that leaves a slot
//! empty simply isn't called for that kind, and nobody else is affected.
//!
//! # Example
//!
//! ```ignore
//! let handlers = Handlers::new()
//!     .on_connect(|_| info!("live"))
//!     .on_new_message(|msg| println!("{}", msg.message.preview(30)))
//!     .on_new_notification(|n| println!("{}", n.notification.message));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, ErrorNotice, NoticeKind};
use crate::identifiers::SubscriberId;
use crate::protocol::{
    BookingUpdate, EventKind, InboundEvent, InitialData, MessagePage, NewMessage,
    NewNotification, Presence, ReadReceipt,
};

use super::event::{DisconnectInfo, RealtimeEvent, SessionInfo};

// ============================================================================
// Types
// ============================================================================

/// A subscriber callback for payload `T`.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

// ============================================================================
// Handlers
// ============================================================================

/// Callbacks one subscriber wants invoked, grouped by event kind.
#[derive(Clone, Default)]
pub struct Handlers {
    connect: Vec<Callback<SessionInfo>>,
    disconnect: Vec<Callback<DisconnectInfo>>,
    error: Vec<Callback<ErrorNotice>>,
    new_message: Vec<Callback<NewMessage>>,
    new_notification: Vec<Callback<NewNotification>>,
    presence: Vec<Callback<Presence>>,
    initial_data: Vec<Callback<InitialData>>,
    booking_update: Vec<Callback<BookingUpdate>>,
    read_receipt: Vec<Callback<ReadReceipt>>,
    more_messages: Vec<Callback<MessagePage>>,
}

// ============================================================================
// Handlers - Registration
// ============================================================================

impl Handlers {
    /// Creates an empty handler set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callback for session establishment.
    #[must_use]
    pub fn on_connect(mut self, f: impl Fn(&SessionInfo) + Send + Sync + 'static) -> Self {
        self.connect.push(Arc::new(f));
        self
    }

    /// Adds a callback for session end.
    #[must_use]
    pub fn on_disconnect(mut self, f: impl Fn(&DisconnectInfo) + Send + Sync + 'static) -> Self {
        self.disconnect.push(Arc::new(f));
        self
    }

    /// Adds a callback for transport and server errors.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&ErrorNotice) + Send + Sync + 'static) -> Self {
        self.error.push(Arc::new(f));
        self
    }

    /// Adds a callback for new chat messages.
    #[must_use]
    pub fn on_new_message(mut self, f: impl Fn(&NewMessage) + Send + Sync + 'static) -> Self {
        self.new_message.push(Arc::new(f));
        self
    }

    /// Adds a callback for new notifications.
    #[must_use]
    pub fn on_new_notification(
        mut self,
        f: impl Fn(&NewNotification) + Send + Sync + 'static,
    ) -> Self {
        self.new_notification.push(Arc::new(f));
        self
    }

    /// Adds a callback for presence changes.
    #[must_use]
    pub fn on_presence(mut self, f: impl Fn(&Presence) + Send + Sync + 'static) -> Self {
        self.presence.push(Arc::new(f));
        self
    }

    /// Adds a callback for the post-connect snapshot.
    #[must_use]
    pub fn on_initial_data(mut self, f: impl Fn(&InitialData) + Send + Sync + 'static) -> Self {
        self.initial_data.push(Arc::new(f));
        self
    }

    /// Adds a callback for booking updates.
    #[must_use]
    pub fn on_booking_update(
        mut self,
        f: impl Fn(&BookingUpdate) + Send + Sync + 'static,
    ) -> Self {
        self.booking_update.push(Arc::new(f));
        self
    }

    /// Adds a callback for read receipts.
    #[must_use]
    pub fn on_read_receipt(mut self, f: impl Fn(&ReadReceipt) + Send + Sync + 'static) -> Self {
        self.read_receipt.push(Arc::new(f));
        self
    }

    /// Adds a callback for message pages.
    #[must_use]
    pub fn on_more_messages(mut self, f: impl Fn(&MessagePage) + Send + Sync + 'static) -> Self {
        self.more_messages.push(Arc::new(f));
        self
    }
}

// ============================================================================
// Handlers - Queries
// ============================================================================

impl Handlers {
    /// Returns how many callbacks are registered for `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Connect => self.connect.len(),
            EventKind::Disconnect => self.disconnect.len(),
            EventKind::Error => self.error.len(),
            EventKind::Message => self.new_message.len(),
            EventKind::Notification => self.new_notification.len(),
            EventKind::Presence => self.presence.len(),
            EventKind::InitialData => self.initial_data.len(),
            EventKind::BookingUpdate => self.booking_update.len(),
            EventKind::ReadReceipt => self.read_receipt.len(),
            EventKind::MoreMessages => self.more_messages.len(),
        }
    }

    /// Returns `true` if at least one callback handles `kind`.
    #[inline]
    #[must_use]
    pub fn handles(&self, kind: EventKind) -> bool {
        self.count(kind) > 0
    }
}

// ============================================================================
// Handlers - Invocation
// ============================================================================

impl Handlers {
    /// Invokes every callback matching `event`, in registration order.
    ///
    /// Each callback runs isolated: a panic is caught, logged as
    /// [`Error::Handler`], and the remaining callbacks still run.
    /// Returns the number of faults.
    pub(crate) fn invoke(&self, subscriber_id: SubscriberId, event: &RealtimeEvent) -> usize {
        let kind = event.kind();

        match event {
            RealtimeEvent::Connected(info) => call_each(subscriber_id, kind, &self.connect, info),
            RealtimeEvent::Disconnected(info) => {
                call_each(subscriber_id, kind, &self.disconnect, info)
            }
            RealtimeEvent::Error(notice) => call_each(subscriber_id, kind, &self.error, notice),
            RealtimeEvent::Inbound(inbound) => match inbound {
                InboundEvent::Message(msg) => {
                    call_each(subscriber_id, kind, &self.new_message, msg)
                }
                InboundEvent::Notification(n) => {
                    call_each(subscriber_id, kind, &self.new_notification, n)
                }
                InboundEvent::Error(err) => {
                    let notice = ErrorNotice::new(NoticeKind::Server, err.message.clone());
                    call_each(subscriber_id, kind, &self.error, &notice)
                }
                InboundEvent::Presence(p) => call_each(subscriber_id, kind, &self.presence, p),
                InboundEvent::InitialData(data) => {
                    call_each(subscriber_id, kind, &self.initial_data, data)
                }
                InboundEvent::BookingUpdate(update) => {
                    call_each(subscriber_id, kind, &self.booking_update, update)
                }
                InboundEvent::ReadReceipt(receipt) => {
                    call_each(subscriber_id, kind, &self.read_receipt, receipt)
                }
                InboundEvent::MoreMessages(page) => {
                    call_each(subscriber_id, kind, &self.more_messages, page)
                }
            },
        }
    }
}

fn call_each<T>(
    subscriber_id: SubscriberId,
    kind: EventKind,
    callbacks: &[Callback<T>],
    payload: &T,
) -> usize {
    let mut faults = 0;

    for callback in callbacks {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(payload))) {
            faults += 1;
            let err = Error::handler(subscriber_id, kind, panic_message(panic.as_ref()));
            warn!(error = %err, "Subscriber handler faulted");
        }
    }

    faults
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("connect", &self.connect.len())
            .field("disconnect", &self.disconnect.len())
            .field("error", &self.error.len())
            .field("new_message", &self.new_message.len())
            .field("new_notification", &self.new_notification.len())
            .field("presence", &self.presence.len())
            .field("initial_data", &self.initial_data.len())
            .field("booking_update", &self.booking_update.len())
            .field("read_receipt", &self.read_receipt.len())
            .field("more_messages", &self.more_messages.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::identifiers::SessionId;

    fn connected() -> RealtimeEvent {
        RealtimeEvent::Connected(SessionInfo {
            session_id: SessionId::new(1),
            url: "ws://localhost/ws/".into(),
            retries: 0,
        })
    }

    #[test]
    fn test_empty_set_handles_nothing() {
        let handlers = Handlers::new();
        assert!(!handlers.handles(EventKind::Connect));
        assert_eq!(handlers.invoke(SubscriberId::new(1), &connected()), 0);
    }

    #[test]
    fn test_callbacks_for_same_kind_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&log), Arc::clone(&log));

        let handlers = Handlers::new()
            .on_connect(move |_| a.lock().push("first"))
            .on_connect(move |_| b.lock().push("second"));

        assert_eq!(handlers.count(EventKind::Connect), 2);
        handlers.invoke(SubscriberId::new(1), &connected());
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);

        let handlers = Handlers::new()
            .on_connect(|_| panic!("render failed"))
            .on_connect(move |_| sink.lock().push("ran"));

        let faults = handlers.invoke(SubscriberId::new(9), &connected());
        assert_eq!(faults, 1);
        assert_eq!(*log.lock(), vec!["ran"]);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_debug_shows_counts() {
        let handlers = Handlers::new().on_error(|_| {});
        let debug = format!("{handlers:?}");
        assert!(debug.contains("error: 1"));
    }
}
