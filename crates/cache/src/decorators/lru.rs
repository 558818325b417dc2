use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use persica_core::Result;

use crate::store::Cache;

/// Evicts the least-recently-used key once `capacity` is exceeded (spec
/// §4.4). Order tracking lives in this decorator; the delegate is the
/// source of truth for values.
pub struct LruCache<K, V> {
    delegate: Arc<dyn Cache<K, V>>,
    capacity: usize,
    order: Mutex<VecDeque<K>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(delegate: Arc<dyn Cache<K, V>>, capacity: usize) -> Self {
        Self {
            delegate,
            capacity,
            order: Mutex::new(VecDeque::new()),
        }
    }

    fn touch(&self, key: &K) {
        let mut order = self.order.lock().unwrap();
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.clone());
    }
}

impl<K, V> Cache<K, V> for LruCache<K, V>
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
        self.delegate.put(key.clone(), value)?;
        self.touch(&key);
        loop {
            let evicted = {
                let mut order = self.order.lock().unwrap();
                if order.len() > self.capacity {
                    order.pop_front()
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
        let value = self.delegate.get(key)?;
        if value.is_some() {
            self.touch(key);
        }
        Ok(value)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.order.lock().unwrap().retain(|k| k != key);
        self.delegate.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.order.lock().unwrap().clear();
        self.delegate.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PlainCache;

    #[test]
    fn evicts_least_recently_used() {
        let cache = LruCache::new(Arc::new(PlainCache::new("t")), 2);
        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.get(&1).unwrap(); // bump 1 to most-recent
        cache.put(3, "c").unwrap(); // evicts 2, the least-recent
        assert_eq!(cache.get(&2).unwrap(), None);
        assert_eq!(cache.get(&1).unwrap(), Some("a"));
        assert_eq!(cache.get(&3).unwrap(), Some("c"));
    }
}
