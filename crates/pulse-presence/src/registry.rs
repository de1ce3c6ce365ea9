//! Per-user observer callbacks over the merged change stream.
//!
//! Observers register for one user and are called with every status edge
//! for that user, in delivery order. The registry also caches the latest
//! known status so queries never touch the network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace};

use crate::status::{PresenceRecord, Status};

type Callback = Arc<dyn Fn(&PresenceRecord) + Send + Sync>;

#[derive(Default)]
struct Inner {
    cache: HashMap<String, Status>,
    observers: HashMap<String, Vec<(u64, Callback)>>,
    next_id: u64,
    closed: bool,
}

/// Shared observer table. Cloning yields another handle to the same table.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking callback runs outside the lock, so a poisoned table is
        // still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` for changes to `user_id`. The observer stays
    /// registered until the returned handle is unsubscribed or dropped.
    pub fn subscribe<F>(&self, user_id: &str, callback: F) -> Subscription
    where
        F: Fn(&PresenceRecord) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        if !inner.closed {
            inner
                .observers
                .entry(user_id.to_string())
                .or_default()
                .push((id, Arc::new(callback)));
            debug!(user_id, id, "observer registered");
        }
        Subscription {
            registry: Arc::downgrade(&self.inner),
            user_id: user_id.to_string(),
            id,
            active: true,
        }
    }

    /// Latest known status for `user_id`; `Offline` if nothing was seen.
    pub fn current_status(&self, user_id: &str) -> Status {
        self.lock().cache.get(user_id).copied().unwrap_or_default()
    }

    /// Number of observers registered for `user_id`.
    pub fn observer_count(&self, user_id: &str) -> usize {
        self.lock().observers.get(user_id).map_or(0, Vec::len)
    }

    /// Record a change and call every observer of its user.
    pub fn dispatch(&self, record: &PresenceRecord) {
        let callbacks: Vec<Callback> = {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            inner.cache.insert(record.user_id.clone(), record.status);
            inner
                .observers
                .get(&record.user_id)
                .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default()
        };

        trace!(user_id = %record.user_id, observers = callbacks.len(), "dispatching change");
        for cb in callbacks {
            cb(record);
        }
    }

    /// Drop every observer and the cache, and stop dispatching. Outstanding
    /// handles become no-ops.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.observers.clear();
        inner.cache.clear();
        inner.closed = true;
    }
}

/// Handle to one registered observer.
#[must_use = "dropping a Subscription unregisters the observer"]
pub struct Subscription {
    registry: Weak<Mutex<Inner>>,
    user_id: String,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Stop receiving changes. Calling it again does nothing.
    pub fn unsubscribe(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = inner.observers.get_mut(&self.user_id) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                inner.observers.remove(&self.user_id);
            }
        }
        debug!(user_id = %self.user_id, id = self.id, "observer removed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
