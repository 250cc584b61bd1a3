// ── Reactive keyed collection ──
//
// Concurrent storage with push-based change notification. Readers take
// cheap `Arc` snapshots; writers go through the owning component.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A concurrent map whose full contents are republished on a `watch`
/// channel after every mutation. Snapshots are sorted by key so output
/// is stable.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: impl Into<String>, entity: T) -> bool {
        let is_new = self.by_key.insert(key.into(), Arc::new(entity)).is_none();
        self.publish();
        is_new
    }

    /// Apply `f` to a copy of the entity under `key` and store the result.
    /// Returns the updated entity, or `None` if the key is unknown.
    pub(crate) fn update<F>(&self, key: &str, f: F) -> Option<Arc<T>>
    where
        F: FnOnce(&mut T),
    {
        let updated = {
            let mut entry = self.by_key.get_mut(key)?;
            let mut value = T::clone(entry.value());
            f(&mut value);
            let value = Arc::new(value);
            *entry.value_mut() = Arc::clone(&value);
            value
        };
        self.publish();
        Some(updated)
    }

    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
