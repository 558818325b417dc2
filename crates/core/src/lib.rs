pub mod bean;
pub mod cache_key;
pub mod error;
pub mod type_handler;
pub mod value;

pub use bean::{BeanAccessor, ValueBean};
pub use cache_key::CacheKey;
pub use error::{Error, Result};
pub use type_handler::{
    resolve_named, CallableSource, ParamSink, RowSource, TypeHandler, TypeHandlerRegistry,
    TypeHandlerRegistryBuilder,
};
pub use value::Value;
