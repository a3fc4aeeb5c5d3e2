//! Named subscriber lists.
//!
//! Each event kind (client connected, packet received, ...) owns one
//! [`Subscribers`] list.  Handlers are added with a name for logging,
//! removed with the [`SubscriptionId`] returned by
//! [`subscribe`](Subscribers::subscribe), and invoked in subscription order.
//!
//! The list is copy-on-write: [`snapshot`](Subscribers::snapshot) returns the
//! current handlers behind an `Arc`, so emitting never holds the lock and a
//! handler may subscribe or unsubscribe while the event is being raised.
//! Such changes take effect from the next emit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`Subscribers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// One registered handler.
pub struct Subscriber<F: ?Sized> {
    pub id: SubscriptionId,
    pub name: String,
    pub handler: Arc<F>,
}

/// Ordered list of handlers of type `F` (usually a `dyn Fn(...)`).
pub struct Subscribers<F: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Arc<Vec<Subscriber<F>>>>,
}

impl<F: ?Sized> Subscribers<F> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Arc::new(Vec::new())),
        }
    }

    /// Adds `handler` at the end of the list.
    pub fn subscribe(&self, name: impl Into<String>, handler: Arc<F>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = Subscriber {
            id,
            name: name.into(),
            handler,
        };

        let mut entries = self.entries.lock();
        let mut next: Vec<Subscriber<F>> = entries.iter().map(Subscriber::share).collect();
        next.push(subscriber);
        *entries = Arc::new(next);
        id
    }

    /// Removes the handler registered under `id`.  Returns `false` if it was
    /// already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        if !entries.iter().any(|s| s.id == id) {
            return false;
        }
        let next = entries
            .iter()
            .filter(|s| s.id != id)
            .map(Subscriber::share)
            .collect();
        *entries = Arc::new(next);
        true
    }

    /// Returns the handlers in subscription order.
    pub fn snapshot(&self) -> Arc<Vec<Subscriber<F>>> {
        Arc::clone(&self.entries.lock())
    }

    /// Names of the current handlers, in subscription order.
    pub fn names(&self) -> Vec<String> {
        self.snapshot().iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<F: ?Sized> Subscriber<F> {
    fn share(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<F: ?Sized> Default for Subscribers<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> std::fmt::Debug for Subscribers<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
