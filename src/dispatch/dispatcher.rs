//! Event dispatcher.
//!
//! Decodes raw frames and fans every resulting event out to the unread
//! aggregator and then to each registered subscriber, in arrival order.
//!
//! The dispatcher is called from the connection manager task only, so
//! events are delivered one at a time, in the order the transport
//! produced them. Nothing is queued: with no subscribers registered, an
//! event is counted and discarded.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::error::ErrorNotice;
use crate::identifiers::SessionId;
use crate::protocol::InboundFrame;
use crate::unread::UnreadAggregator;

use super::event::{DisconnectInfo, RealtimeEvent, SessionInfo};
use super::registry::SubscriberRegistry;

// ============================================================================
// EventDispatcher
// ============================================================================

/// Decodes frames and routes events to subscribers.
#[derive(Debug)]
pub struct EventDispatcher {
    /// Subscribers (owned by the facade, read here).
    registry: Arc<SubscriberRegistry>,
    /// Unread counter.
    unread: Arc<UnreadAggregator>,
    /// Sequence number of the last dispatched event.
    sequence: AtomicU64,
    /// Frames dropped because they failed to decode.
    decode_failures: AtomicU64,
}

impl EventDispatcher {
    /// Creates a dispatcher over a registry and unread counter.
    #[must_use]
    pub fn new(registry: Arc<SubscriberRegistry>, unread: Arc<UnreadAggregator>) -> Self {
        Self {
            registry,
            unread,
            sequence: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
        }
    }

    /// Returns the sequence number of the last dispatched event.
    #[inline]
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Returns the number of frames dropped as undecodable.
    #[inline]
    #[must_use]
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Decodes and dispatches one raw frame.
    ///
    /// Returns the sequence number assigned to the event, or `None` if
    /// the frame was dropped (decode failure) or was a heartbeat reply.
    /// Never fails: decode errors are logged and contained here.
    pub fn on_frame(&self, session_id: SessionId, raw: &str) -> Option<u64> {
        match InboundFrame::decode(raw) {
            Ok(InboundFrame::Event(event)) => {
                Some(self.dispatch(&RealtimeEvent::from_inbound(event)))
            }

            Ok(InboundFrame::Pong(pong)) => {
                trace!(%session_id, timestamp = ?pong.timestamp, "Heartbeat reply");
                None
            }

            Err(e) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%session_id, error = %e, len = raw.len(), "Dropping undecodable frame");
                None
            }
        }
    }

    /// Dispatches a session-established notification.
    pub fn on_connect(&self, info: SessionInfo) -> u64 {
        self.dispatch(&RealtimeEvent::Connected(info))
    }

    /// Dispatches a session-ended notification.
    pub fn on_disconnect(&self, info: DisconnectInfo) -> u64 {
        self.dispatch(&RealtimeEvent::Disconnected(info))
    }

    /// Dispatches an error notice.
    pub fn on_error(&self, notice: ErrorNotice) -> u64 {
        self.dispatch(&RealtimeEvent::Error(notice))
    }

    /// Delivers one event to the unread counter and every subscriber.
    ///
    /// Returns the sequence number assigned to the event.
    pub fn dispatch(&self, event: &RealtimeEvent) -> u64 {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let kind = event.kind();

        self.unread.record_event(kind);

        let subscribers = self.registry.snapshot();
        if subscribers.is_empty() {
            debug!(seq, %kind, "No subscribers, event discarded");
            return seq;
        }

        let mut delivered = 0usize;
        let mut faults = 0usize;

        for (subscriber_id, handlers) in &subscribers {
            if !handlers.handles(kind) {
                continue;
            }
            delivered += 1;
            faults += handlers.invoke(*subscriber_id, event);
        }

        trace!(seq, %kind, delivered, faults, "Event dispatched");
        seq
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::dispatch::Handlers;
    use crate::error::NoticeKind;
    use crate::identifiers::SubscriberId;

    const MESSAGE: &str = r#"{"type":"new_message","payload":{"message":{
        "id":"550e8400-e29b-41d4-a716-446655440000",
        "sender":{"id":"6f1c2b8e-1d0a-4b0e-9c55-2b7f3f0d9a11","first_name":"Omar"},
        "message_text":"hello","created_at":"2024-05-01T09:30:00Z"}}}"#;

    const NOTIFICATION: &str = r#"{"type":"new_notification","payload":{"notification":{
        "id":"550e8400-e29b-41d4-a716-446655440001","message":"Booking confirmed"}}}"#;

    fn setup() -> (Arc<SubscriberRegistry>, Arc<UnreadAggregator>, EventDispatcher) {
        let registry = Arc::new(SubscriberRegistry::new());
        let unread = Arc::new(UnreadAggregator::new());
        let dispatcher = EventDispatcher::new(Arc::clone(&registry), Arc::clone(&unread));
        (registry, unread, dispatcher)
    }

    #[test]
    fn test_frames_delivered_in_order() {
        let (registry, _, dispatcher) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (m, n) = (Arc::clone(&log), Arc::clone(&log));

        registry.insert(
            SubscriberId::new(1),
            Handlers::new()
                .on_new_message(move |msg| m.lock().push(format!("m:{}", msg.message.message_text)))
                .on_new_notification(move |n2| {
                    n.lock().push(format!("n:{}", n2.notification.message))
                }),
        );

        let session = SessionId::new(1);
        assert_eq!(dispatcher.on_frame(session, MESSAGE), Some(1));
        assert_eq!(dispatcher.on_frame(session, NOTIFICATION), Some(2));
        assert_eq!(dispatcher.on_frame(session, MESSAGE), Some(3));

        assert_eq!(
            *log.lock(),
            vec!["m:hello", "n:Booking confirmed", "m:hello"]
        );
        assert_eq!(dispatcher.sequence(), 3);
    }

    #[test]
    fn test_fan_out_survives_faulty_subscriber() {
        let (registry, _, dispatcher) = setup();
        let hits = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&hits);

        registry.insert(
            SubscriberId::new(1),
            Handlers::new().on_new_message(|_| panic!("broken consumer")),
        );
        registry.insert(SubscriberId::new(2), Handlers::new().on_connect(|_| {}));
        registry.insert(
            SubscriberId::new(3),
            Handlers::new().on_new_message(move |_| *sink.lock() += 1),
        );

        dispatcher.on_frame(SessionId::new(1), MESSAGE);
        dispatcher.on_frame(SessionId::new(1), MESSAGE);

        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn test_malformed_frame_is_contained() {
        let (registry, unread, dispatcher) = setup();
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);

        registry.insert(
            SubscriberId::new(1),
            Handlers::new()
                .on_new_message(move |_| *flag.lock() = true)
                .on_error(|_| panic!("decode errors must not reach on_error")),
        );

        for raw in ["", "{", "[]", r#"{"type":"typing","payload":{}}"#, r#"{"type":"new_message"}"#] {
            assert_eq!(dispatcher.on_frame(SessionId::new(1), raw), None);
        }

        assert!(!*called.lock());
        assert_eq!(unread.count(), 0);
        assert_eq!(dispatcher.decode_failures(), 5);
        assert_eq!(dispatcher.sequence(), 0);
    }

    #[test]
    fn test_pong_is_not_dispatched() {
        let (_, unread, dispatcher) = setup();
        assert_eq!(
            dispatcher.on_frame(SessionId::new(1), r#"{"type":"pong","payload":{"timestamp":"2024-05-01T09:30:00"}}"#),
            None
        );
        assert_eq!(dispatcher.sequence(), 0);
        assert_eq!(dispatcher.decode_failures(), 0);
        assert_eq!(unread.count(), 0);
    }

    #[test]
    fn test_server_error_reaches_on_error() {
        let (registry, unread, dispatcher) = setup();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        registry.insert(
            SubscriberId::new(1),
            Handlers::new().on_error(move |notice| *sink.lock() = Some(notice.clone())),
        );

        dispatcher.on_frame(
            SessionId::new(1),
            r#"{"type":"error","payload":{"message":"Unknown action: dance"}}"#,
        );

        let notice = seen.lock().clone().expect("on_error called");
        assert_eq!(notice.kind, NoticeKind::Server);
        assert_eq!(notice.message, "Unknown action: dance");
        assert_eq!(unread.count(), 0);
    }

    #[test]
    fn test_unread_counted_without_subscribers() {
        let (_, unread, dispatcher) = setup();

        dispatcher.on_frame(SessionId::new(1), MESSAGE);
        dispatcher.on_frame(SessionId::new(1), NOTIFICATION);

        assert_eq!(unread.count(), 2);
    }

    #[test]
    fn test_unread_updated_before_handlers_run() {
        let (registry, unread, dispatcher) = setup();
        let observed = Arc::new(Mutex::new(0));
        let (sink, counter) = (Arc::clone(&observed), Arc::clone(&unread));

        registry.insert(
            SubscriberId::new(1),
            Handlers::new().on_new_message(move |_| *sink.lock() = counter.count()),
        );

        dispatcher.on_frame(SessionId::new(1), MESSAGE);
        assert_eq!(*observed.lock(), 1);
    }

    #[test]
    fn test_handler_may_deregister_during_dispatch() {
        let (registry, _, dispatcher) = setup();
        let registry_in_handler = Arc::clone(&registry);

        registry.insert(
            SubscriberId::new(1),
            Handlers::new().on_new_message(move |_| {
                registry_in_handler.remove(SubscriberId::new(1));
            }),
        );

        dispatcher.on_frame(SessionId::new(1), MESSAGE);
        assert!(registry.is_empty());
    }
}
