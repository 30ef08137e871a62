//! Subscriber registry: pattern → bounded delivery queues.
//!
//! Delivery is non-blocking. When a subscriber's queue is full the event for
//! that subscriber is dropped; the dispatcher never waits on a slow consumer.
//! Callers must not assume every change produces a notification, only that a
//! consumer which keeps up eventually hears about the latest change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::pattern::TopicPattern;
use crate::{BusError, Result, TopicEvent};

/// Default capacity of each subscriber's delivery queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Identity of one subscription within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Slot {
    id: SubscriptionId,
    sender: SyncSender<TopicEvent>,
}

#[derive(Default)]
struct State {
    buckets: HashMap<String, Vec<Slot>>,
    closed: bool,
}

/// Maps subscription patterns to delivery queues.
#[derive(Default)]
pub struct Registry {
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a bounded queue and register it under `pattern`.
    ///
    /// Fails with [`BusError::Closed`] once [`Registry::close_all`] has run.
    pub fn subscribe(self: &Arc<Self>, pattern: &str, capacity: usize) -> Result<Subscription> {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if !self.add(pattern, id, sender) {
            return Err(BusError::Closed);
        }

        tracing::debug!("Subscribed {:?} to pattern {:?}", id, pattern);
        Ok(Subscription {
            receiver,
            handle: CancelHandle {
                registry: Arc::downgrade(self),
                pattern: Arc::from(pattern),
                id,
            },
        })
    }

    /// Record a (pattern, queue) pair. Returns `false` if the registry is closed.
    pub fn add(&self, pattern: &str, id: SubscriptionId, sender: SyncSender<TopicEvent>) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state
            .buckets
            .entry(pattern.to_string())
            .or_default()
            .push(Slot { id, sender });
        true
    }

    /// Remove exactly one (pattern, queue) pair, closing its queue.
    ///
    /// Empty buckets are removed. Returns `false` if the pair was not
    /// registered, e.g. because it was already removed or the registry closed.
    pub fn remove(&self, pattern: &str, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let Some(slots) = state.buckets.get_mut(pattern) else {
            return false;
        };
        let Some(pos) = slots.iter().position(|slot| slot.id == id) else {
            return false;
        };

        // Dropping the sender closes the subscriber's queue.
        slots.swap_remove(pos);
        if slots.is_empty() {
            state.buckets.remove(pattern);
        }
        true
    }

    /// Deliver a fresh event for `topic` to every matching subscription.
    ///
    /// Returns the number of queues that accepted the event.
    pub fn fanout(&self, topic: &str) -> usize {
        let state = self.lock();
        let mut delivered = 0;

        for (pattern, slots) in &state.buckets {
            if !TopicPattern::parse(pattern).matches(topic) {
                continue;
            }
            for slot in slots {
                match slot.sender.try_send(TopicEvent::new(topic)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::trace!(
                            "Queue full for {:?}, dropped event for {}",
                            slot.id,
                            topic
                        );
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        tracing::trace!("Subscriber {:?} went away", slot.id);
                    }
                }
            }
        }

        delivered
    }

    /// Close every queue and refuse new subscriptions.
    pub fn close_all(&self) {
        let buckets = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.buckets)
        };
        let count: usize = buckets.values().map(Vec::len).sum();
        tracing::debug!("Closed {} subscriber queues", count);
    }

    /// Number of live subscriptions across all patterns.
    pub fn len(&self) -> usize {
        self.lock().buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct patterns with at least one subscription.
    pub fn pattern_count(&self) -> usize {
        self.lock().buckets.len()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Registry")
            .field("patterns", &state.buckets.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Cancellation signal for one subscription.
///
/// Cloneable and usable from any thread. Cancelling removes only this
/// subscription and closes its queue; cancelling after the registry has
/// closed, or cancelling twice, is a no-op.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    registry: Weak<Registry>,
    pattern: Arc<str>,
    id: SubscriptionId,
}

impl CancelHandle {
    /// Returns `true` if this call removed the subscription.
    pub fn cancel(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => {
                let removed = registry.remove(&self.pattern, self.id);
                if removed {
                    tracing::debug!("Cancelled {:?} on pattern {:?}", self.id, self.pattern);
                }
                removed
            }
            None => false,
        }
    }
}

/// A subscriber's end of a delivery queue.
///
/// Receives [`TopicEvent`]s for topics matching its pattern. The queue ends
/// (receives return `None` / disconnected) once the subscription is
/// cancelled or the owning watcher closes. Dropping the subscription
/// cancels it.
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<TopicEvent>,
    handle: CancelHandle,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.handle.id
    }

    pub fn pattern(&self) -> &str {
        &self.handle.pattern
    }

    /// A detached cancellation signal for this subscription.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// Block until the next event, or `None` once the queue is closed.
    pub fn recv(&self) -> Option<TopicEvent> {
        self.receiver.recv().ok()
    }

    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<TopicEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> std::result::Result<TopicEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Blocking iterator over events until the queue closes.
    pub fn iter(&self) -> mpsc::Iter<'_, TopicEvent> {
        self.receiver.iter()
    }

    /// Cancel this subscription.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
