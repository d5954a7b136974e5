//! Stable network identities for game objects.
//!
//! The host and its clients refer to "the same" enemy through an
//! [`EntityId`]. Ids are strictly positive, handed out in increasing order,
//! and never reassigned to another entity while the registry lives.
//!
//! Gameplay code can either mint an id at creation time and store it on the
//! entity ([`EntityRegistry::mint`]), or let the registry associate an id with
//! whatever key identifies the entity on first lookup ([`EntityRegistry::id_for`]).
//! Entries are never removed; a registry is scoped to a single match.

use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

use crate::messages::EntityId;

/// Opaque key the gameplay layer uses to identify one of its objects
/// (an arena index, a generational handle, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(pub u64);

pub struct EntityRegistry<K = EntityHandle> {
    ids: DashMap<K, EntityId>,
    next_id: AtomicU32,
}

impl<K: Eq + Hash> EntityRegistry<K> {
    pub fn new() -> Self {
        Self {
            ids: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Returns the id already associated with `key`, or mints and records a
    /// new one. The check and the insert happen under the same shard lock, so
    /// concurrent callers always agree.
    pub fn id_for(&self, key: K) -> EntityId {
        *self
            .ids
            .entry(key)
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Looks up an existing association without minting.
    pub fn get(&self, key: &K) -> Option<EntityId> {
        self.ids.get(key).map(|id| *id)
    }

    /// Mints an id that is not tied to any key. Shares the counter with
    /// [`id_for`](Self::id_for), so the two never collide.
    pub fn mint(&self) -> EntityId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of keyed associations.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<K: Eq + Hash> Default for EntityRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
