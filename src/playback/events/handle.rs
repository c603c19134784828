use super::SessionEvent;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::debug;

type SubscriptionId = u64;

struct Subscription {
    tx: tokio_mpsc::UnboundedSender<SessionEvent>,
}

/// Handle for publishing session events and subscribing to them.
///
/// Publishing fans out synchronously, so subscribers observe events in the
/// exact order the session owner produced them.
#[derive(Clone)]
pub struct SessionEventHandle {
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionEventHandle {
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch an event to all subscribers
    pub(crate) fn publish(&self, event: SessionEvent) {
        let mut subs = self.subscriptions();
        let mut to_remove = Vec::new();

        for (id, subscription) in subs.iter() {
            // If send fails, receiver was dropped - mark for removal
            if subscription.tx.send(event.clone()).is_err() {
                to_remove.push(*id);
            }
        }

        for id in to_remove {
            debug!("Removing closed event subscription {}", id);
            subs.remove(&id);
        }
    }

    /// Subscribe to all session events
    /// Subscription is automatically removed when receiver is dropped
    pub fn subscribe_all(&self) -> tokio_mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.subscriptions().insert(id, Subscription { tx });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions().len()
    }
}

impl Default for SessionEventHandle {
    fn default() -> Self {
        Self::new()
    }
}
