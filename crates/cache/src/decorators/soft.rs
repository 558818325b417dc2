use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};

use persica_core::Result;

use crate::store::Cache;

const DEFAULT_HOT_CAPACITY: usize = 256;

/// A reference-reclaimable store (spec §4.4's Soft/Weak decorators). Rust
/// has no GC-driven soft/weak references, so values are held behind `Weak`
/// and a bounded strong-reference ring keeps the `hot_capacity` most
/// recently touched entries alive; everything else is reclaimed as soon as
/// its last external `Arc` (if any) is dropped. `get`/`put`/`remove` each
/// lazily prune dead weak entries, standing in for a reference-queue sweep.
///
/// Unlike the other decorators, `Soft`/`Weak` own storage directly rather
/// than forwarding to a further delegate — they occupy the same structural
/// role as the plain `Base` store, since reclamation has to operate on the
/// literal stored value rather than on whatever an arbitrary delegate
/// happens to do with it.
pub struct ReclaimableCache<K, V> {
    id: String,
    map: Mutex<HashMap<K, Weak<V>>>,
    hot: Mutex<VecDeque<Arc<V>>>,
    hot_capacity: usize,
}

impl<K, V> ReclaimableCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Soft semantics: a bounded ring of strong references keeps the
    /// hottest `hot_capacity` entries alive even under memory pressure.
    pub fn soft(id: impl Into<String>, hot_capacity: usize) -> Self {
        Self {
            id: id.into(),
            map: Mutex::new(HashMap::new()),
            hot: Mutex::new(VecDeque::new()),
            hot_capacity,
        }
    }

    pub fn soft_default(id: impl Into<String>) -> Self {
        Self::soft(id, DEFAULT_HOT_CAPACITY)
    }

    /// Weak semantics: no forced retention at all.
    pub fn weak(id: impl Into<String>) -> Self {
        Self::soft(id, 0)
    }

    fn prune(&self) {
        self.map.lock().unwrap().retain(|_, v| v.strong_count() > 0);
    }

    fn retain_hot(&self, value: Arc<V>) {
        if self.hot_capacity == 0 {
            return;
        }
        let mut hot = self.hot.lock().unwrap();
        hot.push_back(value);
        while hot.len() > self.hot_capacity {
            hot.pop_front();
        }
    }
}

impl<K, V> Cache<K, V> for ReclaimableCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn size(&self) -> usize {
        self.prune();
        self.map.lock().unwrap().len()
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        self.prune();
        let strong = Arc::new(value);
        self.map.lock().unwrap().insert(key, Arc::downgrade(&strong));
        self.retain_hot(strong);
        Ok(())
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        self.prune();
        let weak = self.map.lock().unwrap().get(key).cloned();
        match weak.and_then(|w| w.upgrade()) {
            Some(strong) => {
                let value = (*strong).clone();
                self.retain_hot(strong);
                Ok(Some(value))
            }
            None => {
                self.map.lock().unwrap().remove(key);
                Ok(None)
            }
        }
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        let weak = self.map.lock().unwrap().remove(key);
        Ok(weak.and_then(|w| w.upgrade()).map(|arc| (*arc).clone()))
    }

    fn clear(&self) -> Result<()> {
        self.map.lock().unwrap().clear();
        self.hot.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_ring_keeps_recent_entries_reachable() {
        let cache: ReclaimableCache<i32, String> = ReclaimableCache::soft("t", 2);
        cache.put(1, "a".to_string()).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some("a".to_string()));
    }

    #[test]
    fn weak_reclaims_once_the_hot_ring_is_disabled() {
        let cache: ReclaimableCache<i32, String> = ReclaimableCache::weak("t");
        cache.put(1, "a".to_string()).unwrap();
        // With no strong-reference ring, the only Arc was the one created by
        // `put`, which is dropped once `put` returns; the weak entry is dead.
        assert_eq!(cache.get(&1).unwrap(), None);
    }
}
