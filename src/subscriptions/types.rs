//! Subscription handles.

use crate::changes::ChangeSet;
use crate::source::Source;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback invoked for every broadcast event.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Capability for one listener registered on a source.
///
/// Cancelling (or dropping) the handle unregisters the listener; no event is
/// delivered to it afterwards.
pub struct Subscription {
    id: SubscriptionId,
    source: Arc<dyn Source>,
    closed: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, source: Arc<dyn Source>) -> Self {
        Self {
            id,
            source,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Unregister the listener. Idempotent.
    pub fn cancel(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.source.unsubscribe(self.id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Stream of change sets for one identity (or for every record).
///
/// Change sets are buffered without bound, so none is ever dropped. An
/// identity-scoped stream completes after delivering the removal of its
/// record: once the buffer is drained, `recv` reports disconnection.
pub struct ChangeStream {
    receiver: crossbeam_channel::Receiver<ChangeSet>,
    subscription: Subscription,
}

impl ChangeStream {
    pub(crate) fn new(
        receiver: crossbeam_channel::Receiver<ChangeSet>,
        subscription: Subscription,
    ) -> Self {
        Self {
            receiver,
            subscription,
        }
    }

    /// Receive the next change set (blocking).
    pub fn recv(&self) -> Result<ChangeSet, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a change set (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeSet, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<ChangeSet, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain every change set buffered so far.
    pub fn drain(&self) -> Vec<ChangeSet> {
        self.receiver.try_iter().collect()
    }

    /// True once the stream has completed and its buffer is empty.
    pub fn is_complete(&self) -> bool {
        self.receiver.is_empty()
            && matches!(
                self.receiver.try_recv(),
                Err(crossbeam_channel::TryRecvError::Disconnected)
            )
    }

    /// Stop receiving change sets.
    pub fn cancel(&self) {
        self.subscription.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.subscription.is_closed()
    }
}

impl std::fmt::Debug for ChangeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeStream")
            .field("subscription", &self.subscription)
            .field("pending", &self.receiver.len())
            .finish()
    }
}
