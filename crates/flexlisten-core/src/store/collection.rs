// ── Generic reactive entity collection ──
//
// Insertion-ordered storage with push-based change notification via
// `watch` channels. Collections live inside the store's lock; mutations
// mark the collection dirty and `publish()` rebuilds the snapshot once the
// whole store operation is finished, so subscribers never see a
// half-applied change.

use std::hash::Hash;
use std::sync::Arc;

use indexmap::{Equivalent, IndexMap};
use tokio::sync::watch;

/// A reactive collection for a single entity type.
pub(crate) struct EntityCollection<K, T> {
    /// Primary storage, in first-seen order.
    by_key: IndexMap<K, Arc<T>>,

    /// Full snapshot, rebuilt on publish for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,

    dirty: bool,
}

impl<K: Hash + Eq, T> EntityCollection<K, T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: IndexMap::new(),
            snapshot,
            dirty: false,
        }
    }

    /// Insert or replace an entity. Returns the stored `Arc` and whether
    /// the key was new.
    pub(crate) fn upsert(&mut self, key: K, entity: T) -> (Arc<T>, bool) {
        let entity = Arc::new(entity);
        let is_new = self.by_key.insert(key, Arc::clone(&entity)).is_none();
        self.dirty = true;
        (entity, is_new)
    }

    /// Remove an entity by key, keeping the order of the rest.
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<Arc<T>>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let removed = self.by_key.shift_remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Replace the whole collection.
    pub(crate) fn replace_all(&mut self, entities: impl IntoIterator<Item = (K, T)>) {
        self.by_key = entities
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect();
        self.dirty = true;
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&Arc<T>>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.by_key.get(key)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &Arc<T>)> {
        self.by_key.iter()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Arc<T>> {
        self.by_key.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Get the current published snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    /// Rebuild the snapshot and notify subscribers if anything changed
    /// since the last publish.
    pub(crate) fn publish(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        let values: Vec<Arc<T>> = self.by_key.values().cloned().collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
