use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use persica_core::{Error, Result};

use crate::store::Cache;

/// A latch that starts closed and is opened exactly once. Mirrors
/// `CountDownLatch(1)` from MyBatis's `BlockingCache`.
struct Latch {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    fn new() -> Self {
        Self {
            state: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn open(&self) {
        *self.state.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn await_open(&self, timeout: Option<Duration>) -> std::result::Result<(), ()> {
        let guard = self.state.lock().unwrap();
        match timeout {
            None => {
                let _ = self.cond.wait_while(guard, |open| !*open).unwrap();
                Ok(())
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                let mut guard = guard;
                while !*guard {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(());
                    }
                    let (g, result) = self.cond.wait_timeout(guard, remaining).unwrap();
                    guard = g;
                    if result.timed_out() && !*guard {
                        return Err(());
                    }
                }
                Ok(())
            }
        }
    }
}

/// Single-flight cache decorator: only one thread may hold the lock for a
/// given key at a time (spec §4.4, invariant 6). A thread that misses the
/// cache acquires the key's lock and keeps it until it calls `put` or
/// `remove`, which publishes the computed value and releases waiters.
/// Grounded on MyBatis's `ConcurrentHashMap<Object, CountDownLatch>`-based
/// `BlockingCache`.
pub struct BlockingCache<K, V> {
    delegate: Arc<dyn Cache<K, V>>,
    locks: Mutex<HashMap<K, Arc<Latch>>>,
    timeout: Option<Duration>,
}

impl<K, V> BlockingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(delegate: Arc<dyn Cache<K, V>>) -> Self {
        Self {
            delegate,
            locks: Mutex::new(HashMap::new()),
            timeout: None,
        }
    }

    pub fn with_timeout(delegate: Arc<dyn Cache<K, V>>, timeout: Duration) -> Self {
        Self {
            delegate,
            locks: Mutex::new(HashMap::new()),
            timeout: Some(timeout),
        }
    }

    /// Acquires the per-key lock, blocking the caller until either this
    /// thread becomes the holder or the current holder releases it.
    fn acquire(&self, key: &K) -> Result<()> {
        loop {
            let latch = {
                let mut locks = self.locks.lock().unwrap();
                match locks.get(key) {
                    Some(existing) => Some(existing.clone()),
                    None => {
                        locks.insert(key.clone(), Arc::new(Latch::new()));
                        None
                    }
                }
            };
            match latch {
                None => return Ok(()), // this thread is now the holder
                Some(latch) => {
                    latch
                        .await_open(self.timeout)
                        .map_err(|_| Error::Cache("blocking cache lock timed out".to_string()))?;
                    // latch opened: the previous holder released the key, retry
                }
            }
        }
    }

    /// Releases the holder's lock, waking anyone waiting on this key.
    fn release(&self, key: &K) {
        if let Some(latch) = self.locks.lock().unwrap().remove(key) {
            latch.open();
        }
    }
}

impl<K, V> Cache<K, V> for BlockingCache<K, V>
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
        self.release(&key);
        Ok(())
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        self.acquire(key)?;
        let value = self.delegate.get(key)?;
        if value.is_some() {
            // a holder that found a hit has nothing further to publish
            self.release(key);
        }
        Ok(value)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        let value = self.delegate.remove(key)?;
        self.release(key);
        Ok(value)
    }

    fn clear(&self) -> Result<()> {
        self.locks.lock().unwrap().clear();
        self.delegate.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PlainCache;
    use std::thread;

    #[test]
    fn second_thread_observes_value_published_by_the_first() {
        let cache = Arc::new(BlockingCache::new(Arc::new(PlainCache::new("t"))));

        // thread A misses, becomes the holder, computes, publishes
        assert_eq!(cache.get(&1).unwrap(), None);

        let cache2 = cache.clone();
        let handle = thread::spawn(move || {
            // thread B blocks behind the (already-released) key, then hits
            cache2.get(&1).unwrap()
        });

        cache.put(1, "computed").unwrap();
        assert_eq!(handle.join().unwrap(), Some("computed"));
    }

    #[test]
    fn timeout_surfaces_as_cache_error_when_holder_never_releases() {
        let cache: BlockingCache<i32, &str> =
            BlockingCache::with_timeout(Arc::new(PlainCache::new("t")), Duration::from_millis(10));
        cache.get(&1).unwrap(); // this thread becomes the holder and never releases
        let err = cache.acquire(&1).unwrap_err();
        assert!(matches!(err, Error::Cache(_)));
    }
}
