use persica_ast::{render, BoundSql, ExprCache};
use persica_core::{BeanAccessor, Result, TypeHandlerRegistry, Value};
use persica_mapper::Row;

use crate::connection::{CallableStatementHandle, Connection, PreparedStatementHandle, RowCursor};
use crate::statement::{CompiledStatement, StatementType};

/// Renders a compiled statement's AST against `argument` (spec §4.2's
/// `render` contract, the first step of `StatementHandler::parameterize`).
pub fn render_statement(statement: &CompiledStatement, argument: Value, expr_cache: &ExprCache) -> Result<BoundSql> {
    render(&statement.ast, argument, statement.database_id.as_deref(), expr_cache)
}

/// What a query-shaped execution produced: the fetched rows, plus (for
/// `Callable` statements) the still-open callable handle so the caller can
/// read out-parameters before closing it (spec §4.6.4).
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub callable: Option<Box<dyn CallableStatementHandle>>,
}

/// Runs `bound` as a query against `connection`, dispatching on the
/// statement's `StatementType` (spec §4.9): `Simple` takes its SQL at
/// execute time and skips parameterization entirely; `Prepared`/`Callable`
/// bind parameters at prepare time via the Parameter Binder.
pub fn query(
    statement: &CompiledStatement,
    bound: &BoundSql,
    connection: &mut dyn Connection,
    argument: &Value,
    bean: &dyn BeanAccessor,
    type_handlers: &TypeHandlerRegistry,
    jdbc_type_for_null: &str,
) -> Result<QueryOutput> {
    match statement.statement_type {
        StatementType::Simple => {
            let mut stmt = connection.create_simple_statement()?;
            let rows = {
                let mut cursor = stmt.execute_query(&bound.sql)?;
                drain(cursor.as_mut())?
            };
            stmt.close()?;
            Ok(QueryOutput { rows, callable: None })
        }
        StatementType::Prepared => {
            let mut stmt = connection.prepare(&bound.sql)?;
            apply_execution_knobs(statement, stmt.as_mut())?;
            crate::binder::bind_parameters(stmt.as_mut(), bound, argument, bean, type_handlers, jdbc_type_for_null)?;
            let rows = {
                let mut cursor = stmt.execute_query()?;
                drain(cursor.as_mut())?
            };
            stmt.close()?;
            Ok(QueryOutput { rows, callable: None })
        }
        StatementType::Callable => {
            let mut stmt = connection.prepare_callable(&bound.sql)?;
            apply_execution_knobs(statement, stmt.as_mut())?;
            crate::binder::bind_parameters(stmt.as_mut(), bound, argument, bean, type_handlers, jdbc_type_for_null)?;
            let rows = {
                let mut cursor = stmt.execute_query()?;
                drain(cursor.as_mut())?
            };
            Ok(QueryOutput { rows, callable: Some(stmt) })
        }
    }
}

/// Opens a lazy cursor instead of materializing every row, for the mapper's
/// cursor-mode result production (spec §4.6's "produce a lazy cursor").
/// Only meaningful for `Prepared`/`Simple` — a driver binding that can't
/// stream falls back to whatever its `RowCursor` impl buffers internally.
pub fn query_cursor(
    statement: &CompiledStatement,
    bound: &BoundSql,
    connection: &mut dyn Connection,
    argument: &Value,
    bean: &dyn BeanAccessor,
    type_handlers: &TypeHandlerRegistry,
    jdbc_type_for_null: &str,
) -> Result<Box<dyn RowCursor>> {
    match statement.statement_type {
        StatementType::Simple => {
            let mut stmt = connection.create_simple_statement()?;
            stmt.execute_query(&bound.sql)
        }
        _ => {
            let mut stmt = connection.prepare(&bound.sql)?;
            apply_execution_knobs(statement, stmt.as_mut())?;
            crate::binder::bind_parameters(stmt.as_mut(), bound, argument, bean, type_handlers, jdbc_type_for_null)?;
            stmt.execute_query()
        }
    }
}

/// What an update-shaped execution produced: affected-row count plus any
/// generated-keys rows, for JDBC3-style key population (spec §4.8).
pub struct UpdateOutput {
    pub affected: u64,
    pub generated_keys: Vec<Row>,
}

pub fn update(
    statement: &CompiledStatement,
    bound: &BoundSql,
    connection: &mut dyn Connection,
    argument: &Value,
    bean: &dyn BeanAccessor,
    type_handlers: &TypeHandlerRegistry,
    jdbc_type_for_null: &str,
) -> Result<UpdateOutput> {
    match statement.statement_type {
        StatementType::Simple => {
            let mut stmt = connection.create_simple_statement()?;
            let affected = stmt.execute_update(&bound.sql)?;
            stmt.close()?;
            Ok(UpdateOutput { affected, generated_keys: Vec::new() })
        }
        StatementType::Prepared => {
            let mut stmt = connection.prepare(&bound.sql)?;
            apply_execution_knobs(statement, stmt.as_mut())?;
            crate::binder::bind_parameters(stmt.as_mut(), bound, argument, bean, type_handlers, jdbc_type_for_null)?;
            let affected = stmt.execute_update()?;
            let generated_keys = stmt.generated_keys()?;
            stmt.close()?;
            Ok(UpdateOutput { affected, generated_keys })
        }
        StatementType::Callable => {
            let mut stmt = connection.prepare_callable(&bound.sql)?;
            apply_execution_knobs(statement, stmt.as_mut())?;
            crate::binder::bind_parameters(stmt.as_mut(), bound, argument, bean, type_handlers, jdbc_type_for_null)?;
            let affected = stmt.execute_update()?;
            let generated_keys = stmt.generated_keys()?;
            stmt.close()?;
            Ok(UpdateOutput { affected, generated_keys })
        }
    }
}

pub(crate) fn apply_execution_knobs(statement: &CompiledStatement, stmt: &mut dyn PreparedStatementHandle) -> Result<()> {
    if let Some(fetch_size) = statement.fetch_size {
        stmt.set_fetch_size(fetch_size)?;
    }
    if let Some(timeout) = statement.timeout_seconds {
        stmt.set_timeout_seconds(timeout)?;
    }
    Ok(())
}

pub(crate) fn drain(cursor: &mut dyn RowCursor) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.next()? {
        rows.push(row);
    }
    Ok(rows)
}
