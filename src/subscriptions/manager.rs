//! Subscription manager for broadcasting source events.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{Listener, SubscriptionId};

/// Internal subscription state.
struct Subscription<E> {
    listener: Listener<E>,
    /// Set on unsubscribe; checked before every delivery.
    closed: Arc<AtomicBool>,
}

/// Manages listeners and broadcasts events to them in registration order.
///
/// Listeners run synchronously inside `broadcast`, outside of any internal
/// lock, so a listener may subscribe or unsubscribe (itself included).
pub struct SubscriptionManager<E> {
    /// Active subscriptions, ordered by id (= registration order).
    subscriptions: RwLock<BTreeMap<SubscriptionId, Subscription<E>>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl<E> SubscriptionManager<E> {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: Listener<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let subscription = Subscription {
            listener,
            closed: Arc::new(AtomicBool::new(false)),
        };

        self.subscriptions.write().insert(id, subscription);
        tracing::trace!(?id, "listener subscribed");
        id
    }

    /// Unsubscribe and clean up. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.subscriptions.write().remove(&id) {
            Some(sub) => {
                sub.closed.store(true, Ordering::SeqCst);
                tracing::trace!(?id, "listener unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver an event to every open listener, in registration order.
    pub fn broadcast(&self, event: &E) {
        let targets: Vec<(Listener<E>, Arc<AtomicBool>)> = {
            let subs = self.subscriptions.read();
            subs.values()
                .map(|sub| (Arc::clone(&sub.listener), Arc::clone(&sub.closed)))
                .collect()
        };

        for (listener, closed) in targets {
            // A listener earlier in this round may have cancelled this one.
            if closed.load(Ordering::SeqCst) {
                continue;
            }
            listener(event);
        }
    }
}

impl<E> Default for SubscriptionManager<E> {
    fn default() -> Self {
        Self::new()
    }
}
