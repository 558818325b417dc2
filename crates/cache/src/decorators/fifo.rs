use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use persica_core::Result;

use crate::store::Cache;

/// Evicts the oldest key once `capacity` is exceeded, independent of access
/// recency (spec §4.4).
pub struct FifoCache<K, V> {
    delegate: Arc<dyn Cache<K, V>>,
    capacity: usize,
    queue: Mutex<VecDeque<K>>,
}

impl<K, V> FifoCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(delegate: Arc<dyn Cache<K, V>>, capacity: usize) -> Self {
        Self {
            delegate,
            capacity,
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl<K, V> Cache<K, V> for FifoCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        let is_new = self.delegate.get(&key)?.is_none();
        self.delegate.put(key.clone(), value)?;
        if is_new {
            self.queue.lock().unwrap().push_back(key);
        }
        loop {
            let evicted = {
                let mut queue = self.queue.lock().unwrap();
                if queue.len() > self.capacity {
                    queue.pop_front()
                } else {
                    None
                }
            };
            match evicted {
                Some(evicted) => self.delegate.remove(&evicted)?,
                None => break,
            };
        }
        Ok(())
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        self.delegate.get(key)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.queue.lock().unwrap().retain(|k| k != key);
        self.delegate.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.queue.lock().unwrap().clear();
        self.delegate.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PlainCache;

    #[test]
    fn evicts_oldest_regardless_of_access() {
        let cache = FifoCache::new(Arc::new(PlainCache::new("t")), 2);
        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.get(&1).unwrap(); // access does not protect from FIFO eviction
        cache.put(3, "c").unwrap(); // evicts 1, the oldest insertion
        assert_eq!(cache.get(&1).unwrap(), None);
        assert_eq!(cache.get(&2).unwrap(), Some("b"));
        assert_eq!(cache.get(&3).unwrap(), Some("c"));
    }
}
