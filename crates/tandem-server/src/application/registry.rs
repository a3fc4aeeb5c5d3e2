//! Client registry and id allocation.
//!
//! The registry maps [`ClientId`] to the live [`Session`].  Slots exist only
//! while a client is connected: admission inserts one, disconnect removes
//! it.  The connection limit is checked and the slot inserted under a single
//! write lock, so concurrent accepts can never exceed it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tandem_core::ClientId;
use tokio::sync::mpsc;

use super::session::{Outbound, Session};

/// Hands out client ids.  Ids start at 1 and are never reused within a
/// process, so a stale event for a departed client can never hit a
/// newcomer.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicI32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: ClientId) -> Self {
        Self {
            next: AtomicI32::new(first),
        }
    }

    pub fn next(&self) -> ClientId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> ClientId {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`ClientRegistry::admit`].
#[derive(Debug)]
pub enum Admission {
    Admitted(Arc<Session>),
    /// The registry already holds `limit` clients.  No id was consumed.
    Full,
    /// The allocator produced an id that is already registered.
    Duplicate(ClientId),
}

/// Live sessions keyed by id.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    sessions: RwLock<HashMap<ClientId, Arc<Session>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id and registers a new session for `peer`, unless the
    /// registry is full.
    pub fn admit(
        &self,
        ids: &IdAllocator,
        limit: usize,
        peer: SocketAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Admission {
        let mut sessions = self.sessions.write();
        if sessions.len() >= limit {
            return Admission::Full;
        }

        let id = ids.next();
        match sessions.entry(id) {
            Entry::Occupied(_) => Admission::Duplicate(id),
            Entry::Vacant(slot) => {
                let session = Arc::new(Session::new(id, peer, outbound));
                slot.insert(Arc::clone(&session));
                Admission::Admitted(session)
            }
        }
    }

    /// Inserts `session`.  Returns `false` and keeps the existing entry if
    /// the id is already taken.
    pub fn register(&self, session: Arc<Session>) -> bool {
        match self.sessions.write().entry(session.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        }
    }

    pub fn unregister(&self, id: ClientId) -> Option<Arc<Session>> {
        self.sessions.write().remove(&id)
    }

    pub fn get(&self, id: ClientId) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    /// Snapshot of every registered session, in id order.
    pub fn all(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by_key(|s| s.id());
        sessions
    }

    /// Registered ids, ascending.
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.sessions.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn session(id: ClientId) -> Arc<Session> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Session::new(id, peer(), tx))
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn test_duplicate_register_keeps_original() {
        // Arrange
        let registry = ClientRegistry::new();
        let original = session(4);
        let impostor = session(4);

        // Act
        let first = registry.register(Arc::clone(&original));
        let second = registry.register(impostor);

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get(4).unwrap(), &original));
    }

    #[test]
    fn test_unregister_then_get_is_none() {
        let registry = ClientRegistry::new();
        registry.register(session(1));

        let removed = registry.unregister(1);

        assert_eq!(removed.map(|s| s.id()), Some(1));
        assert!(registry.get(1).is_none());
        assert!(registry.unregister(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_admit_assigns_sequential_ids() {
        // Arrange
        let registry = ClientRegistry::new();
        let ids = IdAllocator::new();

        // Act
        let admitted: Vec<ClientId> = (0..3)
            .map(|_| {
                let (tx, _rx) = mpsc::unbounded_channel();
                match registry.admit(&ids, 10, peer(), tx) {
                    Admission::Admitted(s) => s.id(),
                    other => panic!("unexpected {other:?}"),
                }
            })
            .collect();

        // Assert
        assert_eq!(admitted, vec![1, 2, 3]);
        assert_eq!(registry.ids(), vec![1, 2, 3]);
    }

    #[test]
    fn test_admit_when_full_consumes_no_id() {
        // Arrange
        let registry = ClientRegistry::new();
        let ids = IdAllocator::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.admit(&ids, 1, peer(), tx);

        // Act
        let (tx, _rx) = mpsc::unbounded_channel();
        let refused = registry.admit(&ids, 1, peer(), tx);

        // Assert
        assert!(matches!(refused, Admission::Full));
        assert_eq!(registry.len(), 1);
        assert_eq!(ids.peek(), 2);
    }

    #[test]
    fn test_admit_reports_duplicate_id() {
        let registry = ClientRegistry::new();
        registry.register(session(1));
        let ids = IdAllocator::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = registry.admit(&ids, 10, peer(), tx);

        assert!(matches!(result, Admission::Duplicate(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_slot_reopens_after_unregister() {
        let registry = ClientRegistry::new();
        let ids = IdAllocator::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.admit(&ids, 1, peer(), tx);
        registry.unregister(1);

        let (tx, _rx) = mpsc::unbounded_channel();
        let again = registry.admit(&ids, 1, peer(), tx);

        assert!(matches!(again, Admission::Admitted(ref s) if s.id() == 2));
    }
}
