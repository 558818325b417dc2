use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use persica_core::Error;
use persica_core::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::Cache;

/// Round-trips every value through `serde_json` before handing it to the
/// byte-oriented delegate (spec §4.4). Mirrors MyBatis's `SerializedCache`,
/// which deep-copies values through Java serialization so that a caller
/// mutating a returned object can never corrupt the cached copy.
pub struct SerializedCache<K, V> {
    delegate: Arc<dyn Cache<K, Vec<u8>>>,
    _value: PhantomData<fn() -> V>,
}

impl<K, V> SerializedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(delegate: Arc<dyn Cache<K, Vec<u8>>>) -> Self {
        Self {
            delegate,
            _value: PhantomData,
        }
    }
}

impl<K, V> Cache<K, V> for SerializedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        let bytes = serde_json::to_vec(&value)
            .map_err(|e| Error::Cache(format!("serialize failed: {e}")))?;
        self.delegate.put(key, bytes)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        match self.delegate.get(key)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Cache(format!("deserialize failed: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        match self.delegate.remove(key)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Cache(format!("deserialize failed: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn clear(&self) -> Result<()> {
        self.delegate.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PlainCache;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
    struct Row {
        id: i64,
        name: String,
    }

    #[test]
    fn round_trips_through_json_bytes() {
        let cache: SerializedCache<i32, Row> =
            SerializedCache::new(Arc::new(PlainCache::new("t")));
        cache
            .put(1, Row { id: 1, name: "a".into() })
            .unwrap();
        let mut fetched = cache.get(&1).unwrap().unwrap();
        fetched.name.push_str("-mutated");
        // mutating the returned copy must not affect what's stored
        assert_eq!(
            cache.get(&1).unwrap().unwrap(),
            Row { id: 1, name: "a".into() }
        );
    }
}
