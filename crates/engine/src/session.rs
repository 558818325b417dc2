use std::sync::Arc;

use persica_core::{BeanAccessor, Error, Result, Value};
use persica_mapper::RowBounds;

use crate::connection::RowCursor;
use crate::executor::Executor;
use crate::keygen;
use crate::statement::{KeyGenerator, StatementRegistry};

/// The public-facing unit of work (spec §4.7/§6): one `Executor`, the
/// frozen configuration it runs against, and the Key Generator orchestration
/// that wraps `update` for insert statements. Grounded on the teacher's
/// "one façade, delegate to the layer that actually knows how" shape
/// (`FluffConfig` wrapping `FluffConfig::from_source`-style helpers).
pub struct Session {
    executor: Box<dyn Executor>,
    registry: Arc<StatementRegistry>,
    bean: Arc<dyn BeanAccessor>,
}

impl Session {
    pub fn new(executor: Box<dyn Executor>, registry: Arc<StatementRegistry>, bean: Arc<dyn BeanAccessor>) -> Self {
        Self { executor, registry, bean }
    }

    /// Exactly zero or one row; more than one is a configuration/usage error
    /// (spec §4.7's `selectOne` contract).
    pub fn select_one(&mut self, statement_id: &str, argument: Value) -> Result<Option<Value>> {
        let mut rows = self.select_list(statement_id, argument, RowBounds::default())?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows.remove(0))),
            n => Err(Error::execution(statement_id, format!("expected at most one row, got {n}"))),
        }
    }

    pub fn select_list(&mut self, statement_id: &str, argument: Value, bounds: RowBounds) -> Result<Vec<Value>> {
        let mut argument = argument;
        self.executor.query(statement_id, &mut argument, bounds, None)
    }

    /// Groups rows by a property's value into a map, discarding the
    /// ordering `select_list` otherwise preserves (spec §4.7's `selectMap`).
    pub fn select_map(&mut self, statement_id: &str, argument: Value, key_property: &str) -> Result<persica_helpers::IndexMap<String, Value>> {
        let rows = self.select_list(statement_id, argument, RowBounds::default())?;
        let mut map = persica_helpers::IndexMap::default();
        for row in rows {
            let key = self.bean.get(&row, key_property)?;
            map.insert(format!("{key:?}"), row);
        }
        Ok(map)
    }

    pub fn select_cursor(&mut self, statement_id: &str, argument: Value) -> Result<Box<dyn RowCursor>> {
        self.executor.query_cursor(statement_id, &argument)
    }

    /// Inserts `argument`, writing back any generated key into it (spec
    /// §4.8) — taken by `&mut` rather than by value so the caller's own
    /// object observes the generated key afterward, the way a Key
    /// Generator is meant to be used.
    pub fn insert(&mut self, statement_id: &str, argument: &mut Value) -> Result<u64> {
        self.write(statement_id, argument)
    }

    pub fn update(&mut self, statement_id: &str, argument: &mut Value) -> Result<u64> {
        self.write(statement_id, argument)
    }

    pub fn delete(&mut self, statement_id: &str, argument: &mut Value) -> Result<u64> {
        self.write(statement_id, argument)
    }

    fn write(&mut self, statement_id: &str, argument: &mut Value) -> Result<u64> {
        let statement = self.registry.statement(statement_id)?;

        if let Some(KeyGenerator::SelectKey { statement_id: key_stmt, key_property, before: true }) = &statement.key_generator {
            self.run_select_key(key_stmt, key_property, argument)?;
        }

        let outcome = self.executor.update(statement_id, argument)?;

        match &statement.key_generator {
            Some(KeyGenerator::Jdbc3 { key_properties }) => {
                keygen::apply_jdbc3_keys(key_properties, &outcome.generated_keys, std::slice::from_mut(argument), self.bean.as_ref())?;
            }
            Some(KeyGenerator::SelectKey { statement_id: key_stmt, key_property, before: false }) => {
                self.run_select_key(key_stmt, key_property, argument)?;
            }
            _ => {}
        }

        Ok(outcome.affected)
    }

    fn run_select_key(&mut self, key_statement_id: &str, key_property: &str, argument: &mut Value) -> Result<()> {
        let rows = self.executor.query(key_statement_id, argument, RowBounds::default(), None)?;
        keygen::apply_select_key(key_property, rows.first(), argument, self.bean.as_ref())
    }

    pub fn flush(&mut self) -> Result<Vec<u64>> {
        self.executor.flush_statements()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.executor.commit(true)
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.executor.rollback(true)
    }

    pub fn clear_cache(&mut self) {
        self.executor.clear_local_cache();
    }

    pub fn close(&mut self) {
        self.executor.close(false)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use ahash::AHashMap;
    use persica_ast::SqlNode;
    use persica_core::{TypeHandlerRegistryBuilder, ValueBean};

    use super::*;
    use crate::executor::{Executor, UpdateOutcome};
    use crate::statement::{CompiledStatement, StatementKind, StatementRegistryBuilder};

    /// Scripted `Executor`: `query` looks up canned rows by statement id and
    /// records the argument it was called with; `update` returns a fixed
    /// outcome and records its own argument. Enough to exercise `Session`'s
    /// Key Generator orchestration without a real connection.
    struct ScriptedExecutor {
        query_rows: AHashMap<String, Vec<Value>>,
        query_arguments: Rc<RefCell<Vec<Value>>>,
        update_outcome: UpdateOutcome,
        update_arguments: Rc<RefCell<Vec<Value>>>,
    }

    impl Executor for ScriptedExecutor {
        fn query(
            &mut self,
            statement_id: &str,
            argument: &mut Value,
            _bounds: RowBounds,
            _consumer: Option<&mut dyn FnMut(&Value) -> bool>,
        ) -> Result<Vec<Value>> {
            self.query_arguments.borrow_mut().push(argument.clone());
            Ok(self.query_rows.get(statement_id).cloned().unwrap_or_default())
        }

        fn query_cursor(&mut self, _statement_id: &str, _argument: &Value) -> Result<Box<dyn RowCursor>> {
            unimplemented!("not exercised by these tests")
        }

        fn update(&mut self, _statement_id: &str, argument: &mut Value) -> Result<UpdateOutcome> {
            self.update_arguments.borrow_mut().push(argument.clone());
            Ok(self.update_outcome.clone())
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

        fn create_cache_key(&self, _statement_id: &str, _argument: &Value, _bounds: RowBounds) -> Result<CacheKey> {
            Ok(CacheKey::new())
        }

        fn is_closed(&self) -> bool {
            false
        }

        fn close(&mut self, _force_rollback: bool) {}
    }

    fn registry(stmt: CompiledStatement) -> Arc<StatementRegistry> {
        StatementRegistryBuilder::new()
            .register(stmt)
            .result_maps(persica_mapper::ResultMapRegistryBuilder::new().freeze().unwrap())
            .type_handlers(TypeHandlerRegistryBuilder::new().freeze())
            .freeze()
            .unwrap()
    }

    fn ast() -> Arc<SqlNode> {
        Arc::new(SqlNode::StaticText("irrelevant".to_string()))
    }

    #[test]
    fn select_one_rejects_more_than_one_row() {
        let bean: Arc<dyn BeanAccessor> = Arc::new(ValueBean);
        let stmt = CompiledStatement::new("User.byId", StatementKind::Select, ast());
        let reg = registry(stmt);
        let mut rows = AHashMap::default();
        rows.insert("User.byId".to_string(), vec![Value::from("a"), Value::from("b")]);
        let executor = Box::new(ScriptedExecutor {
            query_rows: rows,
            query_arguments: Rc::new(RefCell::new(Vec::new())),
            update_outcome: UpdateOutcome::default(),
            update_arguments: Rc::new(RefCell::new(Vec::new())),
        });
        let mut session = Session::new(executor, reg, bean);
        let err = session.select_one("User.byId", Value::Null).unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
    }

    #[test]
    fn jdbc3_key_generator_writes_generated_id_back_into_the_argument() {
        let bean: Arc<dyn BeanAccessor> = Arc::new(ValueBean);
        let mut stmt = CompiledStatement::new("User.insert", StatementKind::Insert, ast());
        stmt.key_generator = Some(KeyGenerator::Jdbc3 { key_properties: vec!["id".to_string()] });
        let reg = registry(stmt);
        let executor = Box::new(ScriptedExecutor {
            query_rows: AHashMap::default(),
            query_arguments: Rc::new(RefCell::new(Vec::new())),
            update_outcome: UpdateOutcome {
                affected: 1,
                generated_keys: vec![persica_mapper::Row::new().with("id", 42i64)],
            },
            update_arguments: Rc::new(RefCell::new(Vec::new())),
        });
        let mut session = Session::new(executor, reg, bean.clone());
        let mut argument = Value::Map(Default::default());
        let affected = session.insert("User.insert", &mut argument).unwrap();
        assert_eq!(affected, 1);
        assert_eq!(bean.get(&argument, "id").unwrap(), Value::I64(42));
    }

    #[test]
    fn select_key_before_runs_ahead_of_the_insert() {
        let bean: Arc<dyn BeanAccessor> = Arc::new(ValueBean);
        let mut stmt = CompiledStatement::new("User.insert", StatementKind::Insert, ast());
        stmt.key_generator = Some(KeyGenerator::SelectKey {
            statement_id: "User.insert!selectKey".to_string(),
            key_property: "id".to_string(),
            before: true,
        });
        let reg = registry(stmt);
        let mut rows = AHashMap::default();
        rows.insert("User.insert!selectKey".to_string(), vec![Value::I64(7)]);
        let update_arguments = Rc::new(RefCell::new(Vec::new()));
        let executor = Box::new(ScriptedExecutor {
            query_rows: rows,
            query_arguments: Rc::new(RefCell::new(Vec::new())),
            update_outcome: UpdateOutcome { affected: 1, generated_keys: Vec::new() },
            update_arguments: update_arguments.clone(),
        });
        let mut session = Session::new(executor, reg, bean.clone());
        let mut argument = Value::Map(Default::default());
        session.insert("User.insert", &mut argument).unwrap();

        // The id must already be set by the time `update` runs, proving the
        // select-key ran before the insert rather than after it.
        let seen = update_arguments.borrow();
        let applied = bean.get(&seen[0], "id").unwrap();
        assert_eq!(applied, Value::I64(7));
    }
}
