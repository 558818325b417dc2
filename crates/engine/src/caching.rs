use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use persica_cache::Cache;
use persica_core::{CacheKey, Result, Value};
use persica_mapper::RowBounds;

use crate::executor::{Executor, UpdateOutcome};
use crate::statement::{namespace_of, StatementRegistry};

/// One namespace's staged view over its second-level cache (spec §4.7.1):
/// puts and a clear-everything flag are held here until `commit`/`rollback`
/// decide whether they become visible, while reads still check the real
/// cache underneath so an uncommitted write is only visible to the
/// transaction that made it.
struct TransactionalCache {
    delegate: Arc<dyn Cache<CacheKey, Value>>,
    pending_puts: AHashMap<CacheKey, Value>,
    pending_removes: AHashSet<CacheKey>,
    clear_on_commit: bool,
}

impl TransactionalCache {
    fn new(delegate: Arc<dyn Cache<CacheKey, Value>>) -> Self {
        Self {
            delegate,
            pending_puts: AHashMap::default(),
            pending_removes: AHashSet::default(),
            clear_on_commit: false,
        }
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        if self.clear_on_commit || self.pending_removes.contains(key) {
            return Ok(None);
        }
        if let Some(value) = self.pending_puts.get(key) {
            return Ok(Some(value.clone()));
        }
        self.delegate.get(key)
    }

    fn put(&mut self, key: CacheKey, value: Value) {
        self.pending_removes.remove(&key);
        self.pending_puts.insert(key, value);
    }

    fn clear(&mut self) {
        self.clear_on_commit = true;
        self.pending_puts.clear();
        self.pending_removes.clear();
    }

    fn commit(&mut self) -> Result<()> {
        if self.clear_on_commit {
            self.delegate.clear()?;
        }
        for key in self.pending_removes.drain() {
            self.delegate.remove(&key)?;
        }
        for (key, value) in self.pending_puts.drain() {
            self.delegate.put(key, value)?;
        }
        self.clear_on_commit = false;
        Ok(())
    }

    fn rollback(&mut self) {
        self.pending_puts.clear();
        self.pending_removes.clear();
        self.clear_on_commit = false;
    }
}

/// Owns one `TransactionalCache` per namespace touched this transaction
/// (spec §4.7.1).
#[derive(Default)]
struct TransactionalCacheManager {
    caches: AHashMap<String, TransactionalCache>,
}

impl TransactionalCacheManager {
    fn entry(&mut self, namespace: &str, delegate: &Arc<dyn Cache<CacheKey, Value>>) -> &mut TransactionalCache {
        self.caches
            .entry(namespace.to_string())
            .or_insert_with(|| TransactionalCache::new(delegate.clone()))
    }

    fn commit(&mut self) -> Result<()> {
        for cache in self.caches.values_mut() {
            cache.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self) {
        for cache in self.caches.values_mut() {
            cache.rollback();
        }
    }
}

/// Decorates an `Executor` with the second-level (namespace) cache (spec
/// §4.7.1): a cache hit short-circuits the delegate entirely; any write
/// against a cached namespace invalidates it so a later read within the
/// same namespace never observes stale rows.
pub struct CachingExecutor {
    delegate: Box<dyn Executor>,
    registry: Arc<StatementRegistry>,
    transactions: TransactionalCacheManager,
}

impl CachingExecutor {
    pub fn new(delegate: Box<dyn Executor>, registry: Arc<StatementRegistry>) -> Self {
        Self {
            delegate,
            registry,
            transactions: TransactionalCacheManager::default(),
        }
    }

    fn invalidate_namespace(&mut self, statement_id: &str) {
        let namespace = namespace_of(statement_id);
        if let Some(cache) = self.registry.namespace_cache(statement_id) {
            self.transactions.entry(namespace, &cache).clear();
        }
    }
}

impl Executor for CachingExecutor {
    fn query(
        &mut self,
        statement_id: &str,
        argument: &mut Value,
        bounds: RowBounds,
        consumer: Option<&mut dyn FnMut(&Value) -> bool>,
    ) -> Result<Vec<Value>> {
        let statement = self.registry.statement(statement_id)?;
        let Some(namespace_cache) = (statement.use_cache.then(|| self.registry.namespace_cache(statement_id)).flatten()) else {
            return self.delegate.query(statement_id, argument, bounds, consumer);
        };

        let cache_key = self.delegate.create_cache_key(statement_id, argument, bounds)?;
        let namespace = namespace_of(statement_id);
        if let Some(Value::List(rows)) = self.transactions.entry(namespace, &namespace_cache).get(&cache_key)? {
            return Ok(rows);
        }

        let rows = self.delegate.query(statement_id, argument, bounds, consumer)?;
        self.transactions
            .entry(namespace, &namespace_cache)
            .put(cache_key, Value::List(rows.clone()));
        Ok(rows)
    }

    fn query_cursor(&mut self, statement_id: &str, argument: &Value) -> Result<Box<dyn crate::connection::RowCursor>> {
        self.delegate.query_cursor(statement_id, argument)
    }

    fn update(&mut self, statement_id: &str, argument: &mut Value) -> Result<UpdateOutcome> {
        self.invalidate_namespace(statement_id);
        self.delegate.update(statement_id, argument)
    }

    fn flush_statements(&mut self) -> Result<Vec<u64>> {
        self.delegate.flush_statements()
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        self.delegate.commit(required)?;
        if required {
            self.transactions.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        self.delegate.rollback(required)?;
        if required {
            self.transactions.rollback();
        }
        Ok(())
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache();
    }

    fn create_cache_key(&self, statement_id: &str, argument: &Value, bounds: RowBounds) -> Result<CacheKey> {
        self.delegate.create_cache_key(statement_id, argument, bounds)
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }

    fn close(&mut self, force_rollback: bool) {
        self.delegate.close(force_rollback);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::Arc;

    use persica_ast::SqlNode;
    use persica_cache::PlainCache;
    use persica_core::TypeHandlerRegistryBuilder;
    use persica_mapper::RowBounds;

    use super::*;
    use crate::connection::RowCursor;
    use crate::statement::{CompiledStatement, StatementKind, StatementRegistryBuilder};

    /// A bare-bones `Executor` that just counts how many times `query` ran
    /// against the delegate, so a test can assert a second lookup with the
    /// same cache key never reaches it.
    struct CountingExecutor {
        query_calls: Arc<RefCell<usize>>,
        rows: Vec<Value>,
    }

    impl Executor for CountingExecutor {
        fn query(
            &mut self,
            _statement_id: &str,
            _argument: &mut Value,
            _bounds: RowBounds,
            _consumer: Option<&mut dyn FnMut(&Value) -> bool>,
        ) -> Result<Vec<Value>> {
            *self.query_calls.borrow_mut() += 1;
            Ok(self.rows.clone())
        }

        fn query_cursor(&mut self, _statement_id: &str, _argument: &Value) -> Result<Box<dyn RowCursor>> {
            unimplemented!("not exercised by these tests")
        }

        fn update(&mut self, _statement_id: &str, _argument: &mut Value) -> Result<UpdateOutcome> {
            Ok(UpdateOutcome::default())
        }

        fn flush_statements(&mut self) -> Result<Vec<u64>> {
            Ok(Vec::new())
        }

        fn commit(&mut self, _required: bool) -> Result<()> {
            Ok(())
        }

        fn rollback(&mut self, _required: bool) -> Result<()> {
            Ok(())
        }

        fn clear_local_cache(&mut self) {}

        fn create_cache_key(&self, statement_id: &str, argument: &Value, bounds: RowBounds) -> Result<CacheKey> {
            Ok(CacheKey::new().update(statement_id).update(bounds.offset as i64).update(argument.clone()))
        }

        fn is_closed(&self) -> bool {
            false
        }

        fn close(&mut self, _force_rollback: bool) {}
    }

    fn registry_with_cache(use_cache: bool) -> Arc<StatementRegistry> {
        let ast = Arc::new(SqlNode::StaticText("SELECT 1".to_string()));
        let mut stmt = CompiledStatement::new("User.byId", StatementKind::Select, ast);
        stmt.use_cache = use_cache;
        let cache: Arc<dyn Cache<CacheKey, Value>> = Arc::new(PlainCache::new("User"));

        let mut builder = StatementRegistryBuilder::new()
            .register(stmt)
            .result_maps(persica_mapper::ResultMapRegistryBuilder::new().freeze().unwrap())
            .type_handlers(TypeHandlerRegistryBuilder::new().freeze());
        if use_cache {
            builder = builder.namespace_cache("User", cache);
        }
        builder.freeze().unwrap()
    }

    #[test]
    fn second_query_with_same_key_is_served_from_cache() {
        let registry = registry_with_cache(true);
        let calls = Arc::new(RefCell::new(0));
        let delegate = Box::new(CountingExecutor { query_calls: calls.clone(), rows: vec![Value::from("row")] });
        let mut exec = CachingExecutor::new(delegate, registry);

        let mut argument = Value::Null;
        let first = exec.query("User.byId", &mut argument, RowBounds::default(), None).unwrap();
        let second = exec.query("User.byId", &mut argument, RowBounds::default(), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(*calls.borrow(), 1, "the second lookup must be served from the staged namespace cache");
    }

    #[test]
    fn update_invalidates_the_namespace_cache() {
        let registry = registry_with_cache(true);
        let calls = Arc::new(RefCell::new(0));
        let delegate = Box::new(CountingExecutor { query_calls: calls.clone(), rows: vec![Value::from("row")] });
        let mut exec = CachingExecutor::new(delegate, registry);

        let mut argument = Value::Null;
        exec.query("User.byId", &mut argument, RowBounds::default(), None).unwrap();
        exec.update("User.byId", &mut argument).unwrap();
        exec.query("User.byId", &mut argument, RowBounds::default(), None).unwrap();
        assert_eq!(*calls.borrow(), 2, "the post-update query must miss the invalidated cache and reach the delegate again");
    }

    #[test]
    fn uncached_statement_always_reaches_the_delegate() {
        let registry = registry_with_cache(false);
        let calls = Arc::new(RefCell::new(0));
        let delegate = Box::new(CountingExecutor { query_calls: calls.clone(), rows: vec![Value::from("row")] });
        let mut exec = CachingExecutor::new(delegate, registry);

        let mut argument = Value::Null;
        exec.query("User.byId", &mut argument, RowBounds::default(), None).unwrap();
        exec.query("User.byId", &mut argument, RowBounds::default(), None).unwrap();
        assert_eq!(*calls.borrow(), 2, "a statement with useCache=false must never be short-circuited");
    }
}
