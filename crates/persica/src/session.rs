use persica_core::{Result, Value};
use persica_engine::RowCursor as EngineRowCursor;
use persica_mapper::RowBounds;

/// The caller-facing unit of work (spec §6's "Exposed to callers"): thin
/// delegation over `persica_engine::Session`, kept as its own type so the
/// facade crate can evolve its surface (connection pooling, mapper binding
/// convenience) independently of the engine's own `Session`.
pub struct SqlSession {
    inner: persica_engine::Session,
}

impl SqlSession {
    pub(crate) fn new(inner: persica_engine::Session) -> Self {
        Self { inner }
    }

    pub fn select_one(&mut self, statement_id: &str, argument: Value) -> Result<Option<Value>> {
        self.inner.select_one(statement_id, argument)
    }

    pub fn select_list(&mut self, statement_id: &str, argument: Value, bounds: RowBounds) -> Result<Vec<Value>> {
        self.inner.select_list(statement_id, argument, bounds)
    }

    pub fn select_map(&mut self, statement_id: &str, argument: Value, key_property: &str) -> Result<persica_helpers::IndexMap<String, Value>> {
        self.inner.select_map(statement_id, argument, key_property)
    }

    pub fn select_cursor(&mut self, statement_id: &str, argument: Value) -> Result<Box<dyn EngineRowCursor>> {
        self.inner.select_cursor(statement_id, argument)
    }

    /// Inserts `argument`, writing back any key generator's result into it
    /// (spec §4.8) — see `persica_engine::Session::insert`.
    pub fn insert(&mut self, statement_id: &str, argument: &mut Value) -> Result<u64> {
        self.inner.insert(statement_id, argument)
    }

    pub fn update(&mut self, statement_id: &str, argument: &mut Value) -> Result<u64> {
        self.inner.update(statement_id, argument)
    }

    pub fn delete(&mut self, statement_id: &str, argument: &mut Value) -> Result<u64> {
        self.inner.delete(statement_id, argument)
    }

    pub fn flush(&mut self) -> Result<Vec<u64>> {
        self.inner.flush()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.inner.rollback()
    }

    pub fn clear_cache(&mut self) {
        self.inner.clear_cache();
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}
