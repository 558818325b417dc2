use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// Capability a concrete driver binding exposes for pushing a bound
/// parameter into a prepared/callable statement at a given ordinal.
pub trait ParamSink {
    fn bind(&mut self, ordinal: usize, value: Value, column_type: &str) -> Result<()>;
}

/// Capability a concrete driver binding exposes for reading a column back
/// out of the current row.
pub trait RowSource {
    fn get_by_name(&self, column: &str) -> Result<Value>;
    fn get_by_index(&self, index: usize) -> Result<Value>;
    fn column_count(&self) -> usize;
    fn column_name(&self, index: usize) -> Result<String>;
}

/// Capability for reading an out-parameter off a callable statement.
pub trait CallableSource {
    fn get_out_by_index(&self, index: usize) -> Result<Value>;
}

/// Bidirectional conversion between a host type and a column type (spec
/// §4.1). Implementations typically just validate/coerce the `Value`
/// variant; a real embedding's handler would additionally know how to
/// serialize into the driver's wire format.
pub trait TypeHandler: Send + Sync {
    fn set(&self, sink: &mut dyn ParamSink, ordinal: usize, value: &Value, column_type: &str) -> Result<()> {
        sink.bind(ordinal, value.clone(), column_type)
    }

    fn get_by_name(&self, row: &dyn RowSource, column: &str) -> Result<Value> {
        row.get_by_name(column)
    }

    fn get_by_index(&self, row: &dyn RowSource, index: usize) -> Result<Value> {
        row.get_by_index(index)
    }

    fn get_out_by_index(&self, callable: &dyn CallableSource, index: usize) -> Result<Value> {
        callable.get_out_by_index(index)
    }
}

/// The default pass-through handler: forwards `Value` unchanged. Used both
/// as the "sole handler" fallback and as the unknown-type fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughHandler;

impl TypeHandler for PassthroughHandler {}

/// Three lookup tables, per spec §4.1: (host, column) -> handler, column ->
/// handler, and a class-name registry used to resolve enum defaults and
/// explicit overrides. Build-time-mutable, runtime-immutable: constructed
/// through `TypeHandlerRegistryBuilder`, then handed out as `Arc` for
/// read-mostly concurrent use (spec §5).
pub struct TypeHandlerRegistry {
    by_host_and_column: AHashMap<(String, String), Arc<dyn TypeHandler>>,
    by_column: AHashMap<String, Arc<dyn TypeHandler>>,
    by_host: AHashMap<String, Vec<Arc<dyn TypeHandler>>>,
    by_class: AHashMap<String, Arc<dyn TypeHandler>>,
    supertypes: AHashMap<String, Vec<String>>,
    enum_hosts: ahash::AHashSet<String>,
    enum_default: Option<Arc<dyn TypeHandler>>,
    unknown_fallback: Arc<dyn TypeHandler>,
}

impl TypeHandlerRegistry {
    /// Resolution order (spec §4.1): exact (host, column) match, then
    /// (host, null), then the sole handler registered for `host` if
    /// unambiguous, then the host's super-type/interface chain, then the
    /// enum default handler for enum hosts, finally the unknown-type
    /// fallback.
    pub fn resolve(&self, host: &str, column: Option<&str>) -> Arc<dyn TypeHandler> {
        if let Some(column) = column {
            if let Some(h) = self
                .by_host_and_column
                .get(&(host.to_string(), column.to_string()))
            {
                return h.clone();
            }
        }
        if let Some(h) = self
            .by_host_and_column
            .get(&(host.to_string(), String::new()))
        {
            return h.clone();
        }
        if let Some(handlers) = self.by_host.get(host) {
            if handlers.len() == 1 {
                return handlers[0].clone();
            }
        }
        if let Some(parents) = self.supertypes.get(host) {
            for parent in parents {
                let resolved = self.resolve(parent, column);
                if !Arc::ptr_eq(&resolved, &self.unknown_fallback) {
                    return resolved;
                }
            }
        }
        if self.enum_hosts.contains(host) {
            if let Some(h) = &self.enum_default {
                return h.clone();
            }
        }
        if let Some(column) = column {
            if let Some(h) = self.by_column.get(column) {
                return h.clone();
            }
        }
        self.unknown_fallback.clone()
    }

    pub fn by_class(&self, class_name: &str) -> Option<Arc<dyn TypeHandler>> {
        self.by_class.get(class_name).cloned()
    }
}

pub struct TypeHandlerRegistryBuilder {
    by_host_and_column: AHashMap<(String, String), Arc<dyn TypeHandler>>,
    by_column: AHashMap<String, Arc<dyn TypeHandler>>,
    by_host: AHashMap<String, Vec<Arc<dyn TypeHandler>>>,
    by_class: AHashMap<String, Arc<dyn TypeHandler>>,
    supertypes: AHashMap<String, Vec<String>>,
    enum_hosts: ahash::AHashSet<String>,
    enum_default: Option<Arc<dyn TypeHandler>>,
    unknown_fallback: Arc<dyn TypeHandler>,
}

impl Default for TypeHandlerRegistryBuilder {
    fn default() -> Self {
        Self {
            by_host_and_column: AHashMap::default(),
            by_column: AHashMap::default(),
            by_host: AHashMap::default(),
            by_class: AHashMap::default(),
            supertypes: AHashMap::default(),
            enum_hosts: ahash::AHashSet::default(),
            enum_default: None,
            unknown_fallback: Arc::new(PassthroughHandler),
        }
    }
}

impl TypeHandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule (a): handler instance known, explicit host type given.
    pub fn register(
        mut self,
        class_name: &str,
        host: &str,
        column: Option<&str>,
        handler: Arc<dyn TypeHandler>,
    ) -> Self {
        self.by_class.insert(class_name.to_string(), handler.clone());
        self.by_host
            .entry(host.to_string())
            .or_default()
            .push(handler.clone());
        self.by_host_and_column
            .insert((host.to_string(), column.unwrap_or("").to_string()), handler);
        self
    }

    /// Rule (b): handler instance known, no host type — register only under
    /// the column type, to be matched regardless of host.
    pub fn register_for_column(mut self, class_name: &str, column: &str, handler: Arc<dyn TypeHandler>) -> Self {
        self.by_class.insert(class_name.to_string(), handler.clone());
        self.by_column.insert(column.to_string(), handler);
        self
    }

    pub fn register_supertype(mut self, host: &str, supertype: &str) -> Self {
        self.supertypes
            .entry(host.to_string())
            .or_default()
            .push(supertype.to_string());
        self
    }

    pub fn register_enum_host(mut self, host: &str) -> Self {
        self.enum_hosts.insert(host.to_string());
        self
    }

    pub fn enum_default_handler(mut self, handler: Arc<dyn TypeHandler>) -> Self {
        self.enum_default = Some(handler);
        self
    }

    pub fn unknown_fallback(mut self, handler: Arc<dyn TypeHandler>) -> Self {
        self.unknown_fallback = handler;
        self
    }

    pub fn freeze(self) -> Arc<TypeHandlerRegistry> {
        Arc::new(TypeHandlerRegistry {
            by_host_and_column: self.by_host_and_column,
            by_column: self.by_column,
            by_host: self.by_host,
            by_class: self.by_class,
            supertypes: self.supertypes,
            enum_hosts: self.enum_hosts,
            enum_default: self.enum_default,
            unknown_fallback: self.unknown_fallback,
        })
    }
}

/// Looks up a named class/handler, raising `ConfigurationError` if unknown —
/// used when a mapping declares an explicit `typeHandler=` override.
pub fn resolve_named(registry: &TypeHandlerRegistry, class_name: &str) -> Result<Arc<dyn TypeHandler>> {
    registry
        .by_class(class_name)
        .ok_or_else(|| Error::Configuration(format!("unknown type handler `{class_name}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_over_column_only() {
        let specific: Arc<dyn TypeHandler> = Arc::new(PassthroughHandler);
        let generic: Arc<dyn TypeHandler> = Arc::new(PassthroughHandler);
        let registry = TypeHandlerRegistryBuilder::new()
            .register("specific", "i64", Some("INTEGER"), specific.clone())
            .register_for_column("generic", "INTEGER", generic)
            .freeze();

        let resolved = registry.resolve("i64", Some("INTEGER"));
        assert!(Arc::ptr_eq(&resolved, &specific));
    }

    #[test]
    fn unknown_host_falls_back() {
        let registry = TypeHandlerRegistryBuilder::new().freeze();
        let resolved = registry.resolve("mystery", Some("INTEGER"));
        assert!(Arc::ptr_eq(&resolved, &registry.unknown_fallback));
    }

    #[test]
    fn enum_host_uses_enum_default() {
        let enum_handler: Arc<dyn TypeHandler> = Arc::new(PassthroughHandler);
        let registry = TypeHandlerRegistryBuilder::new()
            .register_enum_host("Color")
            .enum_default_handler(enum_handler.clone())
            .freeze();
        let resolved = registry.resolve("Color", Some("VARCHAR"));
        assert!(Arc::ptr_eq(&resolved, &enum_handler));
    }

    #[test]
    fn supertype_chain_is_consulted() {
        let parent_handler: Arc<dyn TypeHandler> = Arc::new(PassthroughHandler);
        let registry = TypeHandlerRegistryBuilder::new()
            .register("parent", "Base", None, parent_handler.clone())
            .register_supertype("Child", "Base")
            .freeze();
        let resolved = registry.resolve("Child", Some("ANY"));
        assert!(Arc::ptr_eq(&resolved, &parent_handler));
    }
}
