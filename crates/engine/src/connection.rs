use persica_core::{CallableSource, ParamSink, Result};
use persica_mapper::Row;

/// External collaborator (spec §6): `borrow()`/`give_back()` over pooled
/// connections. A production embedding wraps its own driver's pool; nothing
/// in `persica-engine` assumes a particular driver.
pub trait DataSource: Send + Sync {
    fn borrow(&self) -> Result<Box<dyn Connection>>;
    fn give_back(&self, connection: Box<dyn Connection>);
}

/// One borrowed database connection. Statement creation mirrors the three
/// `StatementType` shapes in spec §4.9: `Simple` takes its SQL at execute
/// time, `Prepared`/`Callable` take it at creation time.
pub trait Connection {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn PreparedStatementHandle>>;
    fn prepare_callable(&mut self, sql: &str) -> Result<Box<dyn CallableStatementHandle>>;
    fn create_simple_statement(&mut self) -> Result<Box<dyn SimpleStatementHandle>>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

/// A lazily-fetched row stream, for `queryCursor` (spec §4.6's "produce a
/// lazy cursor that materializes rows on demand").
pub trait RowCursor {
    fn next(&mut self) -> Result<Option<Row>>;
}

/// Prepared-statement handle: bound at prepare time, parameterized via
/// `ParamSink`, executed zero or more times (spec §4.9).
pub trait PreparedStatementHandle: ParamSink {
    fn set_fetch_size(&mut self, size: usize) -> Result<()>;
    fn set_timeout_seconds(&mut self, seconds: u64) -> Result<()>;
    fn execute_update(&mut self) -> Result<u64>;
    fn execute_query(&mut self) -> Result<Box<dyn RowCursor>>;
    /// Rows produced by a JDBC3-style generated-keys fetch after an insert
    /// (spec §4.8); empty when the driver wasn't asked for generated keys.
    fn generated_keys(&mut self) -> Result<Vec<Row>>;
    /// Queues the currently-bound parameters as one batch element (spec
    /// §4.7's Batch executor).
    fn add_batch(&mut self) -> Result<()>;
    /// Executes every queued batch element, returning each element's
    /// affected-row count in submission order.
    fn execute_batch(&mut self) -> Result<Vec<u64>>;
    fn close(&mut self) -> Result<()>;
}

/// Plain (unprepared) statement handle: the SQL text is supplied at execute
/// time rather than at creation (spec §4.9).
pub trait SimpleStatementHandle {
    fn execute_update(&mut self, sql: &str) -> Result<u64>;
    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn RowCursor>>;
    fn close(&mut self) -> Result<()>;
}

/// Callable-statement handle: a prepared statement plus out-parameter
/// registration and retrieval (spec §4.6.4/§4.9). Extends `CallableSource`
/// so a handle can be passed straight to the mapper's
/// `apply_output_parameters`.
pub trait CallableStatementHandle: PreparedStatementHandle + CallableSource {
    fn register_out(&mut self, ordinal: usize, jdbc_type: &str) -> Result<()>;
    /// Rows for an out-cursor parameter named `property`, if the driver
    /// already materialized them during execution.
    fn cursor_rows(&mut self, property: &str) -> Result<Vec<Row>>;
}
