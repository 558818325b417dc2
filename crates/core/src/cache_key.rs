use std::hash::{Hash, Hasher};

use crate::value::Value;

/// Structural composite key (spec §4.5 / §3). Equality is component-sequence
/// equality; the hash is an order-sensitive fold, mirroring the teacher's
/// append-then-fold `CacheKey.update` idiom rather than hashing a `Vec` whole
/// (which would hide per-component hash collisions that matter for parity
/// with an order-sensitive implementation).
#[derive(Debug, Clone, Default)]
pub struct CacheKey {
    components: Vec<Value>,
    hash: i64,
    count: usize,
}

impl CacheKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `part` to the ordered component list and folds it into the
    /// running hash, in the same way a cache key is built incrementally from
    /// statement id, row range, SQL text, and bound parameter values.
    pub fn update(mut self, part: impl Into<Value>) -> Self {
        let part = part.into();
        self.hash = self.hash.wrapping_mul(37).wrapping_add(value_hash(&part));
        self.components.push(part);
        self.count += 1;
        self
    }

    pub fn components(&self) -> &[Value] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count && self.hash == other.hash && self.components == other.components
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
        self.count.hash(state);
    }
}

fn value_hash(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => *b as i64 + 1,
        Value::I64(i) => i.wrapping_mul(31),
        Value::F64(f) => f.to_bits() as i64,
        Value::Str(s) => fold_bytes(s.as_bytes()),
        Value::Bytes(b) => fold_bytes(b),
        Value::List(items) => items.iter().fold(17i64, |acc, v| {
            acc.wrapping_mul(37).wrapping_add(value_hash(v))
        }),
        Value::Map(map) => map.iter().fold(17i64, |acc, (k, v)| {
            acc.wrapping_mul(37)
                .wrapping_add(fold_bytes(k.as_bytes()))
                .wrapping_mul(37)
                .wrapping_add(value_hash(v))
        }),
    }
}

fn fold_bytes(bytes: &[u8]) -> i64 {
    bytes
        .iter()
        .fold(7i64, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn equal_components_produce_equal_keys() {
        let a = CacheKey::new()
            .update("stmt.select")
            .update(0i64)
            .update(10i64)
            .update("SELECT * FROM u WHERE id = ?")
            .update(5i64);
        let b = CacheKey::new()
            .update("stmt.select")
            .update(0i64)
            .update(10i64)
            .update("SELECT * FROM u WHERE id = ?")
            .update(5i64);
        assert_eq!(a, b);

        let mut hasher_a = std::collections::hash_map::DefaultHasher::new();
        a.hash(&mut hasher_a);
        let mut hasher_b = std::collections::hash_map::DefaultHasher::new();
        b.hash(&mut hasher_b);
        assert_eq!(hasher_a.finish(), hasher_b.finish());
    }

    #[test]
    fn differing_parameter_value_breaks_equality() {
        let a = CacheKey::new().update("stmt.select").update(5i64);
        let b = CacheKey::new().update("stmt.select").update(6i64);
        assert_ne!(a, b);
    }

    #[test]
    fn order_sensitive() {
        let a = CacheKey::new().update(1i64).update(2i64);
        let b = CacheKey::new().update(2i64).update(1i64);
        assert_ne!(a, b);
    }
}
