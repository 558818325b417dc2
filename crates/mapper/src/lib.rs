//! Result-set mapping: turns fetched rows into object graphs under a
//! Result Map (spec §3/§4.6) — discriminators, constructor mapping,
//! auto-mapping, nested result maps and nested sub-queries, deferred loads.

pub mod handler;
pub mod identity;
pub mod result_map;
pub mod row;
pub mod subquery;

pub use handler::{MapResult, ResultSetHandler, RowBounds};
pub use identity::RowKey;
pub use result_map::{
    AutoMapping, AutoMappingBehavior, Discriminator, Mapping, MapperSettings, Nested, ResultMap,
    ResultMapRegistry, ResultMapRegistryBuilder,
};
pub use row::Row;
pub use subquery::{DeferredLoad, NullSubQueryResolver, SubQueryResolver};
