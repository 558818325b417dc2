//! Compiled-statement registry, parameter binder, key generators, the
//! driver-binding abstraction, and the executors (plain, caching) and
//! session that run statements against it (spec §4.7-§4.9).

pub mod binder;
pub mod caching;
pub mod connection;
pub mod executor;
pub mod handler;
pub mod keygen;
pub mod session;
pub mod statement;

pub use caching::CachingExecutor;
pub use connection::{CallableStatementHandle, Connection, DataSource, PreparedStatementHandle, RowCursor, SimpleStatementHandle};
pub use executor::{Executor, ExecutorStrategy, LocalCacheScope, StatementExecutor, UpdateOutcome};
pub use session::Session;
pub use statement::{CompiledStatement, KeyGenerator, ResultSetType, StatementKind, StatementRegistry, StatementRegistryBuilder, StatementType};
