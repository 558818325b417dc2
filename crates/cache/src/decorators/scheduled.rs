use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use persica_core::Result;

use crate::store::Cache;

/// Clears the whole delegate every `interval` (spec §4.4). There is no
/// background thread here: the clock is checked on each call, matching the
/// synchronous, no-async-runtime posture of the rest of the crate.
pub struct ScheduledCache<K, V> {
    delegate: Arc<dyn Cache<K, V>>,
    interval: Duration,
    started: Instant,
    last_clear_ms: AtomicU64,
}

impl<K, V> ScheduledCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(delegate: Arc<dyn Cache<K, V>>, interval: Duration) -> Self {
        Self {
            delegate,
            interval,
            started: Instant::now(),
            last_clear_ms: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> Result<()> {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let last = self.last_clear_ms.load(Ordering::Relaxed);
        if elapsed_ms.saturating_sub(last) >= self.interval.as_millis() as u64 {
            self.delegate.clear()?;
            self.last_clear_ms.store(elapsed_ms, Ordering::Relaxed);
        }
        Ok(())
    }
}

impl<K, V> Cache<K, V> for ScheduledCache<K, V>
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
        self.tick()?;
        self.delegate.put(key, value)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        self.tick()?;
        self.delegate.get(key)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.tick()?;
        self.delegate.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.delegate.clear()
    }
}
