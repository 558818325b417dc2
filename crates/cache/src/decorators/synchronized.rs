use std::hash::Hash;
use std::sync::{Arc, Mutex};

use persica_core::Result;

use crate::store::Cache;

/// Serializes every call behind a single mutex, for delegates whose own
/// concurrency story can't be trusted (spec §4.4). Coarser than the
/// decorators that merely protect their own bookkeeping (LRU/FIFO) —
/// here the delegate call itself is inside the critical section.
pub struct SynchronizedCache<K, V> {
    delegate: Arc<dyn Cache<K, V>>,
    guard: Mutex<()>,
}

impl<K, V> SynchronizedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(delegate: Arc<dyn Cache<K, V>>) -> Self {
        Self {
            delegate,
            guard: Mutex::new(()),
        }
    }
}

impl<K, V> Cache<K, V> for SynchronizedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        let _lock = self.guard.lock().unwrap();
        self.delegate.size()
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        let _lock = self.guard.lock().unwrap();
        self.delegate.put(key, value)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        let _lock = self.guard.lock().unwrap();
        self.delegate.get(key)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        let _lock = self.guard.lock().unwrap();
        self.delegate.remove(key)
    }

    fn clear(&self) -> Result<()> {
        let _lock = self.guard.lock().unwrap();
        self.delegate.clear()
    }
}
