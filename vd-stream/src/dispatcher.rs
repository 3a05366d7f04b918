//! Synchronous fan-out of stream messages to subscribers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::message::StreamMessage;
use crate::registry::SubscriptionRegistry;

/// Delivers each inbound message to matching subscriptions in their
/// registration order.
///
/// A panicking filter or callback is caught and logged; later
/// subscriptions still see the message, and the connection stays up.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over a shared registry.
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher reads from.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Deliver a message to every matching subscription.
    ///
    /// Subscriptions added during a dispatch cycle see only later
    /// messages; removed ones still finish the current cycle. Returns
    /// the number of callbacks that ran to completion.
    pub fn dispatch(&self, message: &StreamMessage) -> usize {
        let snapshot = self.registry.snapshot();
        let mut delivered = 0;

        for (index, sub) in snapshot.iter().enumerate() {
            let matched = match catch_unwind(AssertUnwindSafe(|| (sub.filter)(message))) {
                Ok(matched) => matched,
                Err(_) => {
                    warn!(
                        "subscription {index} filter panicked on {}",
                        message.event_type.as_str()
                    );
                    continue;
                }
            };

            if !matched {
                continue;
            }

            if catch_unwind(AssertUnwindSafe(|| (sub.callback)(&message.payload))).is_err() {
                warn!(
                    "subscription {index} callback panicked on {}",
                    message.event_type.as_str()
                );
                continue;
            }

            delivered += 1;
        }

        debug!(
            "dispatched {} to {delivered} subscriber(s)",
            message.event_type.as_str()
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use crate::message::StreamEventType;
    use crate::registry::{MessageCallback, MessageFilter};

    fn message(event: &str) -> StreamMessage {
        StreamMessage {
            event_type: StreamEventType::from_str(event),
            payload: serde_json::json!({ "source": event }),
        }
    }

    fn recording_callback(log: Arc<Mutex<Vec<String>>>, tag: &str) -> MessageCallback {
        let tag = tag.to_string();
        Arc::new(move |_payload| log.lock().unwrap().push(tag.clone()))
    }

    fn match_all() -> MessageFilter {
        Arc::new(|_message| true)
    }

    #[test]
    fn test_dispatch_runs_in_registration_order() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add(match_all(), recording_callback(log.clone(), "first"));
        registry.add(match_all(), recording_callback(log.clone(), "second"));
        registry.add(match_all(), recording_callback(log.clone(), "third"));

        let delivered = dispatcher.dispatch(&message("downloadProgress"));

        assert_eq!(delivered, 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_filter_selects_subscriptions() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add(
            Arc::new(|m| m.event_type == StreamEventType::DownloadComplete),
            recording_callback(log.clone(), "complete-only"),
        );
        registry.add(match_all(), recording_callback(log.clone(), "catch-all"));

        dispatcher.dispatch(&message("downloadProgress"));
        assert_eq!(*log.lock().unwrap(), vec!["catch-all"]);

        log.lock().unwrap().clear();
        dispatcher.dispatch(&message("downloadComplete"));
        assert_eq!(*log.lock().unwrap(), vec!["complete-only", "catch-all"]);
    }

    #[test]
    fn test_callback_receives_payload() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let seen = Arc::new(Mutex::new(None));

        let seen_in_callback = seen.clone();
        registry.add(
            match_all(),
            Arc::new(move |payload| {
                *seen_in_callback.lock().unwrap() = Some(payload.clone());
            }),
        );

        dispatcher.dispatch(&StreamMessage {
            event_type: StreamEventType::DownloadProgress,
            payload: serde_json::json!({ "percent": 80 }),
        });

        let seen = seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen["percent"], 80);
    }

    #[test]
    fn test_panicking_callback_does_not_block_later_subscribers() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add(
            match_all(),
            Arc::new(|_payload| panic!("subscriber bug")),
        );
        registry.add(match_all(), recording_callback(log.clone(), "survivor"));

        let delivered = dispatcher.dispatch(&message("downloadComplete"));

        assert_eq!(delivered, 1);
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn test_panicking_filter_skips_only_that_subscription() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add(
            Arc::new(|_m| panic!("filter bug")),
            recording_callback(log.clone(), "never"),
        );
        registry.add(match_all(), recording_callback(log.clone(), "survivor"));

        dispatcher.dispatch(&message("downloadProgress"));
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn test_unknown_event_types_still_dispatch() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add(match_all(), recording_callback(log.clone(), "got-it"));

        let delivered = dispatcher.dispatch(&message("someFutureEvent"));
        assert_eq!(delivered, 1);
        assert_eq!(*log.lock().unwrap(), vec!["got-it"]);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_applies_next_cycle() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let hits = Arc::new(Mutex::new(0u32));

        // The callback removes itself, so it needs a handle to its own
        // Arc; stash it in a slot filled after construction.
        let slot: Arc<Mutex<Option<MessageCallback>>> = Arc::new(Mutex::new(None));
        let callback: MessageCallback = {
            let registry = registry.clone();
            let slot = slot.clone();
            let hits = hits.clone();
            Arc::new(move |_payload| {
                *hits.lock().unwrap() += 1;
                if let Some(own) = slot.lock().unwrap().clone() {
                    registry.remove(&own);
                }
            })
        };
        *slot.lock().unwrap() = Some(callback.clone());
        registry.add(match_all(), callback);

        assert_eq!(dispatcher.dispatch(&message("downloadProgress")), 1);
        assert_eq!(dispatcher.dispatch(&message("downloadProgress")), 0);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_subscribe_during_dispatch_sees_later_messages_only() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        let late_callback = recording_callback(log.clone(), "late");
        let adder: MessageCallback = {
            let registry = registry.clone();
            let late_callback = late_callback.clone();
            Arc::new(move |_payload| {
                registry.add(Arc::new(|_m| true), late_callback.clone());
            })
        };
        registry.add(match_all(), adder.clone());

        assert_eq!(dispatcher.dispatch(&message("downloadProgress")), 1);
        assert!(log.lock().unwrap().is_empty());

        // Second cycle reaches both the adder and the late subscriber.
        registry.remove(&adder);
        assert_eq!(dispatcher.dispatch(&message("downloadProgress")), 1);
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }
}
