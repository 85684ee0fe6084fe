//! Presence registry: who is reachable, and on which connection.
//!
//! The registry is the only shared mutable state in the relay. Every
//! mutation, and every snapshot that gets broadcast after one, goes through a
//! single `parking_lot::Mutex`, so a registration and a disconnect can never
//! interleave into a binding that points at the wrong connection.
//!
//! Registration is last-writer-wins. When two connections register the same
//! identity, the later one takes the binding and the earlier one is not told;
//! it simply stops being reachable by that identity.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::{Mutex, MutexGuard};
use switchboard_core::{ConnectionId, UserId};

/// Identity → connection bindings plus the reverse index used on disconnect.
#[derive(Debug, Default)]
pub struct Bindings {
    by_identity: BTreeMap<UserId, ConnectionId>,
    by_handle: HashMap<ConnectionId, BTreeSet<UserId>>,
}

impl Bindings {
    /// Bind `identity` to `handle`, overwriting any existing binding.
    ///
    /// Returns the connection that lost the identity, if it was held by a
    /// different connection.
    pub fn register(&mut self, identity: UserId, handle: ConnectionId) -> Option<ConnectionId> {
        let previous = self.by_identity.insert(identity.clone(), handle.clone());
        let evicted = previous.filter(|prev| *prev != handle);
        if let Some(prev) = &evicted {
            if let Some(held) = self.by_handle.get_mut(prev) {
                let _ = held.remove(&identity);
                if held.is_empty() {
                    let _ = self.by_handle.remove(prev);
                }
            }
        }
        let _ = self.by_handle.entry(handle).or_default().insert(identity);
        evicted
    }

    /// Current connection for `identity`.
    pub fn resolve(&self, identity: &UserId) -> Option<&ConnectionId> {
        self.by_identity.get(identity)
    }

    /// Drop every binding still held by `handle` and return the freed
    /// identities. Bindings that another connection has since taken over are
    /// left alone.
    pub fn remove_by_handle(&mut self, handle: &ConnectionId) -> Vec<UserId> {
        let Some(held) = self.by_handle.remove(handle) else {
            return Vec::new();
        };
        let mut freed = Vec::with_capacity(held.len());
        for identity in held {
            if self.by_identity.get(&identity) == Some(handle) {
                let _ = self.by_identity.remove(&identity);
                freed.push(identity);
            }
        }
        freed
    }

    /// Snapshot of bound identities, sorted.
    pub fn identities(&self) -> Vec<UserId> {
        self.by_identity.keys().cloned().collect()
    }

    /// Number of bound identities.
    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    /// Whether nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}

/// In-memory presence registry. Constructed once per server and shared
/// behind an `Arc`.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    bindings: Mutex<Bindings>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the registry's critical section.
    ///
    /// Hold the guard across a mutation and the broadcast of its snapshot so
    /// that no other mutation can slip in between.
    pub fn lock(&self) -> MutexGuard<'_, Bindings> {
        self.bindings.lock()
    }

    /// See [`Bindings::register`].
    pub fn register(&self, identity: UserId, handle: ConnectionId) -> Option<ConnectionId> {
        self.lock().register(identity, handle)
    }

    /// Current connection for `identity`, or `None` if the target is offline.
    pub fn resolve(&self, identity: &UserId) -> Option<ConnectionId> {
        self.lock().resolve(identity).cloned()
    }

    /// See [`Bindings::remove_by_handle`].
    pub fn remove_by_handle(&self, handle: &ConnectionId) -> Vec<UserId> {
        self.lock().remove_by_handle(handle)
    }

    /// Snapshot of bound identities, sorted.
    pub fn identities(&self) -> Vec<UserId> {
        self.lock().identities()
    }

    /// Number of bound identities.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
