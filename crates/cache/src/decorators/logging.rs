use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use persica_core::Result;

use crate::store::Cache;

/// Logs `get` hit/miss ratio at debug level (spec §4.4). Counters are
/// process-lifetime and reset on `clear`.
pub struct LoggingCache<K, V> {
    delegate: Arc<dyn Cache<K, V>>,
    hits: AtomicU64,
    requests: AtomicU64,
}

impl<K, V> LoggingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(delegate: Arc<dyn Cache<K, V>>) -> Self {
        Self {
            delegate,
            hits: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        let requests = self.requests.load(Ordering::Relaxed);
        if requests == 0 {
            return 0.0;
        }
        self.hits.load(Ordering::Relaxed) as f64 / requests as f64
    }
}

impl<K, V> Cache<K, V> for LoggingCache<K, V>
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
        self.delegate.put(key, value)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        let value = self.delegate.get(key)?;
        self.requests.fetch_add(1, Ordering::Relaxed);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            "cache {} hit ratio: {:.4}",
            self.delegate.id(),
            self.hit_ratio()
        );
        Ok(value)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.delegate.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.hits.store(0, Ordering::Relaxed);
        self.requests.store(0, Ordering::Relaxed);
        self.delegate.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PlainCache;

    #[test]
    fn tracks_hit_ratio() {
        let cache = LoggingCache::new(Arc::new(PlainCache::new("t")));
        cache.put(1, "a").unwrap();
        cache.get(&1).unwrap(); // hit
        cache.get(&2).unwrap(); // miss
        assert_eq!(cache.hit_ratio(), 0.5);
    }
}
