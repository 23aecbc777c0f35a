//! Identity map.

use crate::instance::UniqueInstance;
use crate::key::RowKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Weak-held singleton map: at most one live in-process instance per
/// (type, id).
///
/// The map never keeps instances alive - entries are weak, and dead entries
/// are pruned opportunistically on insert. Eviction removes only the map
/// entry: holders of strong references keep a live, non-deleted instance,
/// and a later resolve of the same key yields a distinct new instance.
#[derive(Default)]
pub struct IdentityMap {
    entries: RwLock<HashMap<RowKey, Weak<UniqueInstance>>>,
}

impl IdentityMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live instance for a key, if one exists.
    pub fn get(&self, key: &RowKey) -> Option<Arc<UniqueInstance>> {
        self.entries.read().get(key).and_then(Weak::upgrade)
    }

    /// Inserts an instance, returning the existing live instance instead if
    /// another thread won the race.
    pub fn insert(&self, instance: &Arc<UniqueInstance>) -> Arc<UniqueInstance> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(instance.row_key()).and_then(Weak::upgrade) {
            return existing;
        }
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.insert(instance.row_key().clone(), Arc::downgrade(instance));
        Arc::clone(instance)
    }

    /// Removes the entry for a key without touching outstanding references.
    pub fn evict(&self, key: &RowKey) {
        self.entries.write().remove(key);
    }

    /// Marks the live instance deleted (if any) and evicts the entry.
    ///
    /// Returns the instance that was marked, so callers can fan out
    /// notifications.
    pub fn mark_deleted(&self, key: &RowKey) -> Option<Arc<UniqueInstance>> {
        let removed = self.entries.write().remove(key);
        let instance = removed.and_then(|weak| weak.upgrade());
        if let Some(instance) = &instance {
            instance.set_deleted();
        }
        instance
    }

    /// Returns the number of live entries.
    pub fn live_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("live", &self.live_count())
            .finish()
    }
}
