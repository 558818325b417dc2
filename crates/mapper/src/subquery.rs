use persica_core::{CacheKey, Result, Value};

/// A `(target object, property path, cache key, target host type)` record
/// (spec §3), queued when a lazy nested sub-query can't be resolved inline.
/// `row_index` addresses the slot in the top-level result list; `persica-engine`'s
/// `Session` resolves these after the current top-level query's row
/// processing completes and patches the value back in via the bean
/// accessor.
#[derive(Debug, Clone)]
pub struct DeferredLoad {
    pub row_index: usize,
    pub property_path: String,
    pub statement_id: String,
    pub argument: Value,
    pub cache_key: CacheKey,
    pub target_host_type: Option<String>,
}

/// External capability (implemented by `persica-engine`'s executor) for
/// resolving a nested sub-query mapping eagerly: run the referenced
/// statement — consulting the session's caches exactly as any other
/// `query` call would — and return its value (spec §4.6.3).
pub trait SubQueryResolver {
    fn resolve_eager(&mut self, statement_id: &str, argument: Value, cache_key: &CacheKey) -> Result<Value>;
}

/// A resolver that never executes anything; used by tests and by callers
/// who only need the simple/nested-result-map row-processing path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSubQueryResolver;

impl SubQueryResolver for NullSubQueryResolver {
    fn resolve_eager(&mut self, _statement_id: &str, _argument: Value, _cache_key: &CacheKey) -> Result<Value> {
        Ok(Value::Null)
    }
}
