//! Subscription registry for stream consumers.
//!
//! Consumers register a filter predicate together with a callback. The
//! dispatcher later snapshots the registry and invokes the callbacks of
//! matching subscriptions. Removal is by callback identity, so a
//! consumer has to keep the callback it registered in order to
//! unsubscribe.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::message::StreamMessage;

/// Predicate deciding whether a subscription wants a message.
pub type MessageFilter = Arc<dyn Fn(&StreamMessage) -> bool + Send + Sync>;

/// Callback invoked with the payload of each matching message.
pub type MessageCallback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// A registered (filter, callback) pair.
#[derive(Clone)]
pub struct Subscription {
    pub(crate) filter: MessageFilter,
    pub(crate) callback: MessageCallback,
}

/// Ordered collection of active subscriptions.
///
/// Registration order is dispatch order. The same callback may be
/// registered several times, with the same or different filters;
/// `remove` drops every entry holding it.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for messages matching the filter.
    pub fn add(&self, filter: MessageFilter, callback: MessageCallback) {
        let mut subs = self.lock();
        subs.push(Subscription { filter, callback });
        debug!("subscription added ({} active)", subs.len());
    }

    /// Remove every subscription holding this exact callback.
    ///
    /// Identity is the callback allocation, not closure equality: two
    /// closures with identical code are distinct callbacks. Removing an
    /// unknown callback is a no-op. Returns the number of entries
    /// removed.
    pub fn remove(&self, callback: &MessageCallback) -> usize {
        let mut subs = self.lock();
        let before = subs.len();
        subs.retain(|sub| !Arc::ptr_eq(&sub.callback, callback));
        let removed = before - subs.len();
        if removed > 0 {
            debug!("removed {removed} subscription(s) ({} active)", subs.len());
        }
        removed
    }

    /// Snapshot the current subscriptions in registration order.
    ///
    /// Dispatch iterates a snapshot without holding the registry lock,
    /// so callbacks are free to subscribe or unsubscribe reentrantly.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.lock().clone()
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry has no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        // Callbacks never run under this lock, so poisoning can only
        // come from a panic elsewhere; the list itself stays intact.
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::message::StreamEventType;

    fn noop_callback() -> MessageCallback {
        Arc::new(|_payload| {})
    }

    fn match_all() -> MessageFilter {
        Arc::new(|_message| true)
    }

    #[test]
    fn test_add_and_len() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.is_empty());

        registry.add(match_all(), noop_callback());
        registry.add(match_all(), noop_callback());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_by_identity() {
        let registry = SubscriptionRegistry::new();
        let keep = noop_callback();
        let drop_me = noop_callback();

        registry.add(match_all(), keep.clone());
        registry.add(match_all(), drop_me.clone());

        assert_eq!(registry.remove(&drop_me), 1);
        assert_eq!(registry.len(), 1);

        // The remaining entry is the kept callback.
        let snapshot = registry.snapshot();
        assert!(Arc::ptr_eq(&snapshot[0].callback, &keep));
    }

    #[test]
    fn test_remove_drops_every_registration_of_callback() {
        let registry = SubscriptionRegistry::new();
        let callback = noop_callback();

        registry.add(match_all(), callback.clone());
        registry.add(
            Arc::new(|m| m.event_type == StreamEventType::DownloadComplete),
            callback.clone(),
        );
        registry.add(match_all(), noop_callback());

        assert_eq!(registry.remove(&callback), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_unknown_callback_is_noop() {
        let registry = SubscriptionRegistry::new();
        registry.add(match_all(), noop_callback());

        let never_registered = noop_callback();
        assert_eq!(registry.remove(&never_registered), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_identical_closures_are_distinct_callbacks() {
        let registry = SubscriptionRegistry::new();
        let first: MessageCallback = Arc::new(|_payload| {});
        let second: MessageCallback = Arc::new(|_payload| {});

        registry.add(match_all(), first.clone());
        registry.add(match_all(), second);

        assert_eq!(registry.remove(&first), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_preserves_registration_order() {
        let registry = SubscriptionRegistry::new();
        let first = noop_callback();
        let second = noop_callback();
        let third = noop_callback();

        registry.add(match_all(), first.clone());
        registry.add(match_all(), second.clone());
        registry.add(match_all(), third.clone());

        let snapshot = registry.snapshot();
        assert!(Arc::ptr_eq(&snapshot[0].callback, &first));
        assert!(Arc::ptr_eq(&snapshot[1].callback, &second));
        assert!(Arc::ptr_eq(&snapshot[2].callback, &third));
    }

    #[test]
    fn test_snapshot_is_decoupled_from_later_changes() {
        let registry = SubscriptionRegistry::new();
        registry.add(match_all(), noop_callback());

        let snapshot = registry.snapshot();
        registry.add(match_all(), noop_callback());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }
}
