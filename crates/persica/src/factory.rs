use std::sync::Arc;

use persica_core::{BeanAccessor, Result};
use persica_engine::{CachingExecutor, DataSource, Executor, ExecutorStrategy, LocalCacheScope, Session, StatementExecutor, StatementRegistry};

use crate::session::SqlSession;

/// Builds `SqlSession`s against one frozen configuration (spec §6's
/// "consumed from configuration loader / data source / bean accessor"):
/// every session it opens shares the same `StatementRegistry`, borrows a
/// fresh connection from `data_source`, and runs against the same
/// `bean_accessor`. Grounded on the teacher's `FluffConfig`-then-linter
/// shape — one long-lived, `Arc`-shared configuration object handing out
/// short-lived per-call workers.
pub struct SqlSessionFactory {
    registry: Arc<StatementRegistry>,
    data_source: Arc<dyn DataSource>,
    bean_accessor: Arc<dyn BeanAccessor>,
    executor_strategy: ExecutorStrategy,
    local_cache_scope: LocalCacheScope,
}

impl SqlSessionFactory {
    pub fn new(registry: Arc<StatementRegistry>, data_source: Arc<dyn DataSource>, bean_accessor: Arc<dyn BeanAccessor>) -> Self {
        Self {
            registry,
            data_source,
            bean_accessor,
            executor_strategy: ExecutorStrategy::default(),
            local_cache_scope: LocalCacheScope::default(),
        }
    }

    pub fn with_executor_strategy(mut self, strategy: ExecutorStrategy) -> Self {
        self.executor_strategy = strategy;
        self
    }

    pub fn with_local_cache_scope(mut self, scope: LocalCacheScope) -> Self {
        self.local_cache_scope = scope;
        self
    }

    /// Opens a session: borrows a connection, wraps a fresh `StatementExecutor`
    /// in the `CachingExecutor` decorator (spec §4.7.1, always present so a
    /// namespace without a configured cache store is simply a no-op lookup),
    /// and hands the result to a new `Session`.
    pub fn open_session(&self) -> Result<SqlSession> {
        log::debug!("opening session against {} compiled statements", self.registry.len());
        let connection = self.data_source.borrow()?;
        let executor = StatementExecutor::new(connection, self.registry.clone(), self.bean_accessor.clone(), self.executor_strategy, self.local_cache_scope);
        let executor: Box<dyn Executor> = Box::new(CachingExecutor::new(Box::new(executor), self.registry.clone()));
        Ok(SqlSession::new(Session::new(executor, self.registry.clone(), self.bean_accessor.clone())))
    }
}

#[cfg(test)]
mod tests {
    use persica_ast::SqlNode;
    use persica_core::{ParamSink, Result as EngineResult, TypeHandlerRegistryBuilder, Value, ValueBean};
    use persica_engine::{CallableStatementHandle, Connection, PreparedStatementHandle, RowCursor, SimpleStatementHandle, StatementRegistryBuilder};
    use persica_engine::{CompiledStatement, StatementKind};
    use persica_mapper::{Row, ResultMap, ResultMapRegistryBuilder};

    use super::*;

    struct FakeCursor {
        rows: Vec<Row>,
        pos: usize,
    }

    impl RowCursor for FakeCursor {
        fn next(&mut self) -> EngineResult<Option<Row>> {
            if self.pos < self.rows.len() {
                let row = self.rows[self.pos].clone();
                self.pos += 1;
                Ok(Some(row))
            } else {
                Ok(None)
            }
        }
    }

    struct FakePrepared {
        rows: Vec<Row>,
    }

    impl ParamSink for FakePrepared {
        fn bind(&mut self, _ordinal: usize, _value: Value, _column_type: &str) -> EngineResult<()> {
            Ok(())
        }
    }

    impl PreparedStatementHandle for FakePrepared {
        fn set_fetch_size(&mut self, _size: usize) -> EngineResult<()> {
            Ok(())
        }
        fn set_timeout_seconds(&mut self, _seconds: u64) -> EngineResult<()> {
            Ok(())
        }
        fn execute_update(&mut self) -> EngineResult<u64> {
            Ok(1)
        }
        fn execute_query(&mut self) -> EngineResult<Box<dyn RowCursor>> {
            Ok(Box::new(FakeCursor { rows: self.rows.clone(), pos: 0 }))
        }
        fn generated_keys(&mut self) -> EngineResult<Vec<Row>> {
            Ok(Vec::new())
        }
        fn add_batch(&mut self) -> EngineResult<()> {
            Ok(())
        }
        fn execute_batch(&mut self) -> EngineResult<Vec<u64>> {
            Ok(vec![1])
        }
        fn close(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    struct FakeSimple;

    impl SimpleStatementHandle for FakeSimple {
        fn execute_update(&mut self, _sql: &str) -> EngineResult<u64> {
            Ok(1)
        }
        fn execute_query(&mut self, _sql: &str) -> EngineResult<Box<dyn RowCursor>> {
            Ok(Box::new(FakeCursor { rows: Vec::new(), pos: 0 }))
        }
        fn close(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    struct FakeConnection {
        rows: Vec<Row>,
    }

    impl Connection for FakeConnection {
        fn prepare(&mut self, _sql: &str) -> EngineResult<Box<dyn PreparedStatementHandle>> {
            Ok(Box::new(FakePrepared { rows: self.rows.clone() }))
        }
        fn prepare_callable(&mut self, _sql: &str) -> EngineResult<Box<dyn CallableStatementHandle>> {
            unimplemented!("not exercised by these tests")
        }
        fn create_simple_statement(&mut self) -> EngineResult<Box<dyn SimpleStatementHandle>> {
            Ok(Box::new(FakeSimple))
        }
        fn commit(&mut self) -> EngineResult<()> {
            Ok(())
        }
        fn rollback(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    /// Hands out one fresh `FakeConnection` per `borrow()`, discarding
    /// whatever comes back via `give_back` — enough to exercise
    /// `SqlSessionFactory` without a real pool.
    struct FakeDataSource {
        rows: Vec<Row>,
    }

    impl DataSource for FakeDataSource {
        fn borrow(&self) -> EngineResult<Box<dyn Connection>> {
            Ok(Box::new(FakeConnection { rows: self.rows.clone() }))
        }

        fn give_back(&self, _connection: Box<dyn Connection>) {}
    }

    fn registry() -> Arc<StatementRegistry> {
        let ast = Arc::new(SqlNode::StaticText("SELECT 1".to_string()));
        let mut stmt = CompiledStatement::new("User.byId", StatementKind::Select, ast);
        stmt.result_map_ids.push("User".to_string());

        let result_map = ResultMap::new("User", "User");
        let result_maps = ResultMapRegistryBuilder::new().register(result_map).freeze().unwrap();
        let type_handlers = TypeHandlerRegistryBuilder::new().freeze();

        StatementRegistryBuilder::new()
            .register(stmt)
            .result_maps(result_maps)
            .type_handlers(type_handlers)
            .freeze()
            .unwrap()
    }

    #[test]
    fn open_session_runs_a_query_against_the_borrowed_connection() {
        let row = Row::new().with("id", 1i64);
        let data_source: Arc<dyn DataSource> = Arc::new(FakeDataSource { rows: vec![row] });
        let bean: Arc<dyn BeanAccessor> = Arc::new(ValueBean);
        let factory = SqlSessionFactory::new(registry(), data_source, bean);

        let mut session = factory.open_session().unwrap();
        let rows = session.select_list("User.byId", Value::Null, Default::default()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn each_open_session_gets_its_own_connection() {
        let data_source: Arc<dyn DataSource> = Arc::new(FakeDataSource { rows: Vec::new() });
        let bean: Arc<dyn BeanAccessor> = Arc::new(ValueBean);
        let factory = SqlSessionFactory::new(registry(), data_source, bean);

        let mut first = factory.open_session().unwrap();
        let mut second = factory.open_session().unwrap();
        assert_eq!(first.select_list("User.byId", Value::Null, Default::default()).unwrap(), Vec::new());
        assert_eq!(second.select_list("User.byId", Value::Null, Default::default()).unwrap(), Vec::new());
    }
}
