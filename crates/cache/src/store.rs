use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use persica_core::Result;

/// A keyed store (spec §4.4). All decorators and the base store implement
/// this uniformly; decorators hold an owned `delegate` of the same trait and
/// compose by forwarding to it.
pub trait Cache<K, V>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn id(&self) -> &str;
    fn size(&self) -> usize;
    fn put(&self, key: K, value: V) -> Result<()>;
    fn get(&self, key: &K) -> Result<Option<V>>;
    fn remove(&self, key: &K) -> Result<Option<V>>;
    fn clear(&self) -> Result<()>;
}

/// The base store: a plain mapping from key to value (spec §4.4).
pub struct PlainCache<K, V> {
    id: String,
    map: Mutex<HashMap<K, V>>,
}

impl<K, V> PlainCache<K, V> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Cache<K, V> for PlainCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn size(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        self.map.lock().unwrap().insert(key, value);
        Ok(())
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        Ok(self.map.lock().unwrap().remove(key))
    }

    fn clear(&self) -> Result<()> {
        self.map.lock().unwrap().clear();
        Ok(())
    }
}
