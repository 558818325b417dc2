use std::sync::Arc;

use ahash::AHashMap;
use persica_ast::ExprCache;
use persica_core::{BeanAccessor, CacheKey, Error, Result, Value};
use persica_mapper::{ResultSetHandler, Row, RowBounds, SubQueryResolver};

use crate::connection::{Connection, PreparedStatementHandle, RowCursor};
use crate::statement::{CompiledStatement, StatementRegistry, StatementType};

/// Value used for a bound parameter that is null and carries no explicit
/// `jdbcType` hint, matching the teacher's "fall back to a fixed sentinel"
/// convention for otherwise-unresolvable cases.
const JDBC_TYPE_FOR_NULL: &str = "OTHER";

/// Which statement-handle lifecycle an executor follows (spec §4.7): a
/// fresh handle per call, one handle reused across calls with the same SQL,
/// or handles queued and executed together on `flush_statements`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorStrategy {
    #[default]
    Simple,
    Reuse,
    Batch,
}

/// When the local (first-level) cache is cleared (spec §4.7): at the end of
/// every statement (`Statement`), or only on `commit`/`rollback`/explicit
/// `clearLocalCache` (`Session`, the MyBatis default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalCacheScope {
    #[default]
    Session,
    Statement,
}

/// One row's worth of JDBC3-style generated keys plus the affected-row
/// count for a single `update` call.
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    pub affected: u64,
    pub generated_keys: Vec<Row>,
}

/// The statement-execution contract (spec §4.7): `query`/`update` against a
/// borrowed connection, transaction control, local-cache management, and
/// the `createCacheKey` contract a caching decorator folds its own cache
/// key from.
pub trait Executor {
    fn query(
        &mut self,
        statement_id: &str,
        argument: &mut Value,
        bounds: RowBounds,
        consumer: Option<&mut dyn FnMut(&Value) -> bool>,
    ) -> Result<Vec<Value>>;

    fn query_cursor(&mut self, statement_id: &str, argument: &Value) -> Result<Box<dyn RowCursor>>;

    fn update(&mut self, statement_id: &str, argument: &mut Value) -> Result<UpdateOutcome>;

    /// Runs every queued batch element (a no-op for non-`Batch` strategies),
    /// returning each element's affected-row count in submission order.
    fn flush_statements(&mut self) -> Result<Vec<u64>>;

    fn commit(&mut self, required: bool) -> Result<()>;
    fn rollback(&mut self, required: bool) -> Result<()>;

    fn clear_local_cache(&mut self);

    fn create_cache_key(&self, statement_id: &str, argument: &Value, bounds: RowBounds) -> Result<CacheKey>;

    fn is_closed(&self) -> bool;
    fn close(&mut self, force_rollback: bool);
}

#[derive(Debug, Clone)]
enum LocalEntry {
    /// Marks a cache key whose query is currently executing, so a
    /// self-referencing nested sub-query against the same statement and
    /// argument is rejected instead of looping forever (spec §4.7 note on
    /// guarding local-cache re-entrancy).
    Pending,
    Done(Vec<Value>),
}

struct BatchEntry {
    sql: String,
    handle: Box<dyn PreparedStatementHandle>,
}

/// Concrete `Executor`: one borrowed `Connection`, a frozen
/// `StatementRegistry`, and a local cache, parameterized by
/// `ExecutorStrategy` (spec §4.7's Simple/Reuse/Batch executors share all of
/// this; they differ only in prepared-statement-handle lifecycle, which is
/// why they're one struct rather than three).
pub struct StatementExecutor {
    connection: Box<dyn Connection>,
    registry: Arc<StatementRegistry>,
    bean: Arc<dyn BeanAccessor>,
    expr_cache: ExprCache,
    strategy: ExecutorStrategy,
    local_cache_scope: LocalCacheScope,
    local_cache: AHashMap<CacheKey, LocalEntry>,
    reused: AHashMap<String, Box<dyn PreparedStatementHandle>>,
    batch: Vec<BatchEntry>,
    closed: bool,
}

impl StatementExecutor {
    pub fn new(
        connection: Box<dyn Connection>,
        registry: Arc<StatementRegistry>,
        bean: Arc<dyn BeanAccessor>,
        strategy: ExecutorStrategy,
        local_cache_scope: LocalCacheScope,
    ) -> Self {
        Self {
            connection,
            registry,
            bean,
            expr_cache: ExprCache::new(),
            strategy,
            local_cache_scope,
            local_cache: AHashMap::default(),
            reused: AHashMap::default(),
            batch: Vec::new(),
            closed: false,
        }
    }

    fn ensure_open(&self, statement_id: &str) -> Result<()> {
        if self.closed {
            return Err(Error::execution(statement_id, "executor is closed"));
        }
        Ok(())
    }

    fn execute_query_rows(
        &mut self,
        statement: &CompiledStatement,
        bound: &persica_ast::BoundSql,
        argument: &mut Value,
        bounds: RowBounds,
        consumer: Option<&mut dyn FnMut(&Value) -> bool>,
    ) -> Result<Vec<Value>> {
        let output = crate::handler::query(
            statement,
            bound,
            self.connection.as_mut(),
            argument,
            self.bean.as_ref(),
            self.registry.type_handlers(),
            JDBC_TYPE_FOR_NULL,
        )
        .map_err(|e| wrap(statement, e))?;

        let Some(result_map_id) = statement.result_map_ids.first() else {
            return Err(Error::Configuration(format!(
                "statement `{}` has no result map to map rows through",
                statement.id
            )));
        };

        let result_maps = self.registry.result_maps().clone();
        let type_handlers = self.registry.type_handlers().clone();
        let settings = self.registry.settings().clone();
        let bean = self.bean.clone();

        let mut rs_handler = ResultSetHandler::new(&result_maps, &type_handlers, bean.as_ref(), &settings);
        let mut callable = output.callable;
        let map_result = {
            let mut resolver = SelfResolver { exec: self };
            rs_handler
                .handle_result_set(&output.rows, result_map_id, bounds, statement.result_ordered, &mut resolver, consumer)
                .map_err(|e| Error::execution(&statement.id, e.to_string()))?
        };

        let mut rows = map_result.rows;
        for deferred in map_result.deferred_loads {
            let mut sub_argument = deferred.argument.clone();
            let value = self.query_scalar(&deferred.statement_id, &mut sub_argument)?;
            if let Some(row) = rows.get_mut(deferred.row_index) {
                self.bean.set(row, &deferred.property_path, value)?;
            }
        }

        if let Some(stmt) = callable.as_mut() {
            let mut cursor_rows: AHashMap<String, Vec<Row>> = AHashMap::default();
            for mapping in &bound.parameter_mappings {
                if mapping.is_out() && mapping.result_map_id.is_some() {
                    cursor_rows.insert(mapping.property.clone(), stmt.cursor_rows(&mapping.property).map_err(|e| wrap(statement, e))?);
                }
            }
            rs_handler
                .apply_output_parameters(stmt.as_ref(), &bound.parameter_mappings, argument, &cursor_rows)
                .map_err(|e| wrap(statement, e))?;
            stmt.close().map_err(|e| wrap(statement, e))?;
        }

        Ok(rows)
    }

    /// Runs a statement expecting a single scalar/object result, for a
    /// nested sub-query or a deferred load (spec §4.6.3). Returns `Null`
    /// when the referenced statement produces no rows.
    fn query_scalar(&mut self, statement_id: &str, argument: &mut Value) -> Result<Value> {
        let rows = self.query(statement_id, argument, RowBounds::default(), None)?;
        Ok(rows.into_iter().next().unwrap_or(Value::Null))
    }

    fn prepared_handle(&mut self, sql: &str) -> Result<Box<dyn PreparedStatementHandle>> {
        match self.strategy {
            ExecutorStrategy::Reuse => {
                if let Some(handle) = self.reused.remove(sql) {
                    return Ok(handle);
                }
                self.connection.prepare(sql)
            }
            _ => self.connection.prepare(sql),
        }
    }

    fn return_handle(&mut self, sql: &str, handle: Box<dyn PreparedStatementHandle>) {
        if self.strategy == ExecutorStrategy::Reuse {
            self.reused.insert(sql.to_string(), handle);
        }
    }
}

/// Bridges a `StatementExecutor` back into `persica_mapper::SubQueryResolver`
/// so a nested eager sub-query mapping (spec §4.6.3) can call right back
/// into `query` without the mapper knowing anything about executors.
struct SelfResolver<'x> {
    exec: &'x mut StatementExecutor,
}

impl SubQueryResolver for SelfResolver<'_> {
    fn resolve_eager(&mut self, statement_id: &str, mut argument: Value, _cache_key: &CacheKey) -> Result<Value> {
        self.exec.query_scalar(statement_id, &mut argument)
    }
}

fn wrap(statement: &CompiledStatement, error: Error) -> Error {
    match error {
        Error::Execution { .. } => error,
        other => Error::Execution {
            statement_id: statement.id.clone(),
            message: other.to_string(),
            source: None,
        },
    }
}

impl Executor for StatementExecutor {
    fn query(
        &mut self,
        statement_id: &str,
        argument: &mut Value,
        bounds: RowBounds,
        consumer: Option<&mut dyn FnMut(&Value) -> bool>,
    ) -> Result<Vec<Value>> {
        self.ensure_open(statement_id)?;
        let statement = self.registry.statement(statement_id)?;
        let bound = crate::handler::render_statement(&statement, argument.clone(), &self.expr_cache).map_err(|e| wrap(&statement, e))?;
        let cache_key = crate::binder::create_cache_key(statement_id, &bound, argument, self.bean.as_ref(), bounds);

        if let Some(entry) = self.local_cache.get(&cache_key) {
            match entry {
                LocalEntry::Done(rows) => return Ok(rows.clone()),
                LocalEntry::Pending => {
                    return Err(Error::execution(
                        statement_id,
                        "circular statement execution detected against the same arguments",
                    ))
                }
            }
        }

        self.local_cache.insert(cache_key.clone(), LocalEntry::Pending);
        let result = self.execute_query_rows(&statement, &bound, argument, bounds, consumer);
        match result {
            Ok(rows) => {
                self.local_cache.insert(cache_key, LocalEntry::Done(rows.clone()));
                if self.local_cache_scope == LocalCacheScope::Statement {
                    self.clear_local_cache();
                }
                Ok(rows)
            }
            Err(e) => {
                self.local_cache.remove(&cache_key);
                Err(e)
            }
        }
    }

    fn query_cursor(&mut self, statement_id: &str, argument: &Value) -> Result<Box<dyn RowCursor>> {
        self.ensure_open(statement_id)?;
        let statement = self.registry.statement(statement_id)?;
        let bound = crate::handler::render_statement(&statement, argument.clone(), &self.expr_cache).map_err(|e| wrap(&statement, e))?;
        crate::handler::query_cursor(
            &statement,
            &bound,
            self.connection.as_mut(),
            argument,
            self.bean.as_ref(),
            self.registry.type_handlers(),
            JDBC_TYPE_FOR_NULL,
        )
        .map_err(|e| wrap(&statement, e))
    }

    fn update(&mut self, statement_id: &str, argument: &mut Value) -> Result<UpdateOutcome> {
        self.ensure_open(statement_id)?;
        self.clear_local_cache();
        let statement = self.registry.statement(statement_id)?;
        let bound = crate::handler::render_statement(&statement, argument.clone(), &self.expr_cache).map_err(|e| wrap(&statement, e))?;

        if self.strategy == ExecutorStrategy::Batch && statement.statement_type == StatementType::Prepared {
            let reuse_existing = self.batch.last().map(|b| b.sql == bound.sql).unwrap_or(false);
            if !reuse_existing {
                let handle = self.connection.prepare(&bound.sql).map_err(|e| wrap(&statement, e))?;
                self.batch.push(BatchEntry { sql: bound.sql.clone(), handle });
            }
            let handle = &mut self.batch.last_mut().unwrap().handle;
            crate::binder::bind_parameters(handle.as_mut(), &bound, argument, self.bean.as_ref(), self.registry.type_handlers(), JDBC_TYPE_FOR_NULL)
                .map_err(|e| wrap(&statement, e))?;
            handle.add_batch().map_err(|e| wrap(&statement, e))?;
            return Ok(UpdateOutcome::default());
        }

        if self.strategy == ExecutorStrategy::Reuse && statement.statement_type == StatementType::Prepared {
            let mut handle = self.prepared_handle(&bound.sql).map_err(|e| wrap(&statement, e))?;
            crate::binder::bind_parameters(handle.as_mut(), &bound, argument, self.bean.as_ref(), self.registry.type_handlers(), JDBC_TYPE_FOR_NULL)
                .map_err(|e| wrap(&statement, e))?;
            let affected = handle.execute_update().map_err(|e| wrap(&statement, e))?;
            let generated_keys = handle.generated_keys().map_err(|e| wrap(&statement, e))?;
            self.return_handle(&bound.sql, handle);
            return Ok(UpdateOutcome { affected, generated_keys });
        }

        let output = crate::handler::update(
            &statement,
            &bound,
            self.connection.as_mut(),
            argument,
            self.bean.as_ref(),
            self.registry.type_handlers(),
            JDBC_TYPE_FOR_NULL,
        )
        .map_err(|e| wrap(&statement, e))?;
        Ok(UpdateOutcome { affected: output.affected, generated_keys: output.generated_keys })
    }

    fn flush_statements(&mut self) -> Result<Vec<u64>> {
        let mut affected = Vec::new();
        for mut entry in self.batch.drain(..) {
            let counts = entry.handle.execute_batch()?;
            entry.handle.close()?;
            affected.extend(counts);
        }
        Ok(affected)
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        if required {
            self.flush_statements()?;
            self.connection.commit()?;
        }
        self.clear_local_cache();
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        if required {
            self.batch.clear();
            self.connection.rollback()?;
        }
        self.clear_local_cache();
        Ok(())
    }

    fn clear_local_cache(&mut self) {
        self.local_cache.clear();
    }

    fn create_cache_key(&self, statement_id: &str, argument: &Value, bounds: RowBounds) -> Result<CacheKey> {
        let statement = self.registry.statement(statement_id)?;
        let bound = crate::handler::render_statement(&statement, argument.clone(), &self.expr_cache)?;
        Ok(crate::binder::create_cache_key(statement_id, &bound, argument, self.bean.as_ref(), bounds))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self, force_rollback: bool) {
        if self.closed {
            return;
        }
        if force_rollback {
            let _ = self.connection.rollback();
        }
        self.closed = true;
    }
}
