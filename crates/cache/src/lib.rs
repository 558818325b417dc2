//! Composable cache-store decorators over a keyed base store (spec §4.4).
//!
//! Decorators wrap a `delegate: Arc<dyn Cache<K, V>>` and forward to it,
//! each contributing one policy. `namespace_chain` assembles the typical
//! second-level cache stack used by `persica-engine`'s Caching Executor:
//! `Synchronized → Logging → Serialized → Scheduled → LRU → Base`.

mod decorators;
mod store;

pub use decorators::{
    BlockingCache, FifoCache, LoggingCache, LruCache, ReclaimableCache, ScheduledCache,
    SerializedCache, SynchronizedCache,
};
pub use store::{Cache, PlainCache};

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Assembles the typical namespace (second-level) cache chain from spec
/// §4.4: `Synchronized(Logging(Serialized(Scheduled(LRU(Base)))))`.
pub fn namespace_chain<K, V>(
    id: impl Into<String>,
    lru_capacity: usize,
    flush_interval: Duration,
) -> Arc<dyn Cache<K, V>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let base: Arc<dyn Cache<K, Vec<u8>>> = Arc::new(PlainCache::new(id));
    let lru: Arc<dyn Cache<K, Vec<u8>>> = Arc::new(LruCache::new(base, lru_capacity));
    let scheduled: Arc<dyn Cache<K, Vec<u8>>> = Arc::new(ScheduledCache::new(lru, flush_interval));
    let serialized: Arc<dyn Cache<K, V>> = Arc::new(SerializedCache::new(scheduled));
    let logging: Arc<dyn Cache<K, V>> = Arc::new(LoggingCache::new(serialized));
    Arc::new(SynchronizedCache::new(logging))
}
