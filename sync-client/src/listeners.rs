//! Subscriber registry for client events.
//!
//! The registry holds an immutable map behind an `Arc`; subscribe and
//! unsubscribe build a new map and swap it in. Emitting iterates over the
//! map that was current when emission started.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Callback invoked for every event.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by [`Listeners::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Copy-on-write set of listeners.
pub struct Listeners<E> {
    map: Mutex<Arc<BTreeMap<SubscriptionId, Listener<E>>>>,
    next_id: AtomicU64,
}

impl<E> Listeners<E> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            map: Mutex::new(Arc::new(BTreeMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arc<BTreeMap<SubscriptionId, Listener<E>>>> {
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `listener`.
    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut current = self.lock();
        let mut next = BTreeMap::clone(&current);
        next.insert(id, Arc::new(listener));
        *current = Arc::new(next);
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut current = self.lock();
        if !current.contains_key(&id) {
            return false;
        }
        let mut next = BTreeMap::clone(&current);
        next.remove(&id);
        *current = Arc::new(next);
        true
    }

    /// The current map. Later (un)subscriptions do not affect it.
    pub fn snapshot(&self) -> Arc<BTreeMap<SubscriptionId, Listener<E>>> {
        Arc::clone(&self.lock())
    }

    /// Call every listener, in subscription order.
    pub fn emit(&self, event: &E) {
        for listener in self.snapshot().values() {
            listener(event);
        }
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}
