use std::sync::Arc;

use ahash::AHashMap;
use persica_ast::SqlNode;
use persica_cache::Cache;
use persica_core::{CacheKey, Error, Result, TypeHandlerRegistry, Value};
use persica_mapper::{MapperSettings, ResultMapRegistry};

/// What a compiled statement does to the database (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn is_write(&self) -> bool {
        !matches!(self, StatementKind::Select)
    }
}

/// Which `StatementHandler` variant prepares and executes this statement
/// (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    Simple,
    Prepared,
    Callable,
}

/// Result-set traversal mode requested at prepare time (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultSetType {
    #[default]
    ForwardOnly,
    ScrollSensitive,
    ScrollInsensitive,
}

/// Auto-generated key population strategy (spec §4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyGenerator {
    /// Read the driver's generated-keys result after an insert and write
    /// each value through the bean accessor into `key_properties`, in
    /// submission order for batch inserts.
    Jdbc3 { key_properties: Vec<String> },
    /// Run `statement_id` (conventionally `{parent-id}!selectKey`) before or
    /// after the insert and assign its single-row result into
    /// `key_property`.
    SelectKey {
        statement_id: String,
        key_property: String,
        before: bool,
    },
}

/// One `<select>`/`<insert>`/`<update>`/`<delete>` compiled ahead of
/// execution: its dynamic-SQL AST, its result maps (or write-statement key
/// generator), and the per-statement execution knobs (spec §3/§4.9).
pub struct CompiledStatement {
    pub id: String,
    pub kind: StatementKind,
    pub statement_type: StatementType,
    pub ast: Arc<SqlNode>,
    pub database_id: Option<String>,
    /// Result maps consulted in order; a statement with `resultSets` (the
    /// open question in spec §9) would declare more than one. Empty for
    /// write statements.
    pub result_map_ids: Vec<String>,
    pub result_ordered: bool,
    pub use_cache: bool,
    pub fetch_size: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub result_set_type: ResultSetType,
    pub key_generator: Option<KeyGenerator>,
}

impl CompiledStatement {
    pub fn new(id: impl Into<String>, kind: StatementKind, ast: Arc<SqlNode>) -> Self {
        Self {
            id: id.into(),
            kind,
            statement_type: StatementType::Prepared,
            ast,
            database_id: None,
            result_map_ids: Vec::new(),
            result_ordered: false,
            use_cache: matches!(kind, StatementKind::Select),
            fetch_size: None,
            timeout_seconds: None,
            result_set_type: ResultSetType::default(),
            key_generator: None,
        }
    }
}

/// Immutable, shared-read configuration assembled once at startup (spec §5:
/// "build-time-mutable, runtime-immutable"), grounded on the teacher's
/// layered-then-frozen `FluffConfig` (`core/config.rs`). Owns the compiled
/// statements, the Result Map registry, the Type Handler Registry, and one
/// namespace (second-level) cache per mapper namespace.
pub struct StatementRegistry {
    statements: AHashMap<String, Arc<CompiledStatement>>,
    result_maps: Arc<ResultMapRegistry>,
    type_handlers: Arc<TypeHandlerRegistry>,
    namespace_caches: AHashMap<String, Arc<dyn Cache<CacheKey, Value>>>,
    settings: MapperSettings,
}

impl StatementRegistry {
    pub fn statement(&self, id: &str) -> Result<Arc<CompiledStatement>> {
        self.statements
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("unknown statement `{id}`")))
    }

    pub fn result_maps(&self) -> &Arc<ResultMapRegistry> {
        &self.result_maps
    }

    pub fn type_handlers(&self) -> &Arc<TypeHandlerRegistry> {
        &self.type_handlers
    }

    pub fn settings(&self) -> &MapperSettings {
        &self.settings
    }

    /// The namespace cache for `id`'s `namespace.statement` id, if the
    /// namespace declared a second-level cache (spec §4.7.1).
    pub fn namespace_cache(&self, id: &str) -> Option<Arc<dyn Cache<CacheKey, Value>>> {
        let namespace = namespace_of(id);
        self.namespace_caches.get(namespace).cloned()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

pub(crate) fn namespace_of(statement_id: &str) -> &str {
    statement_id.rsplit_once('.').map(|(ns, _)| ns).unwrap_or(statement_id)
}

pub struct StatementRegistryBuilder {
    statements: AHashMap<String, CompiledStatement>,
    result_maps: Option<Arc<ResultMapRegistry>>,
    type_handlers: Option<Arc<TypeHandlerRegistry>>,
    namespace_caches: AHashMap<String, Arc<dyn Cache<CacheKey, Value>>>,
    settings: MapperSettings,
}

impl Default for StatementRegistryBuilder {
    fn default() -> Self {
        Self {
            statements: AHashMap::default(),
            result_maps: None,
            type_handlers: None,
            namespace_caches: AHashMap::default(),
            settings: MapperSettings::default(),
        }
    }
}

impl StatementRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, statement: CompiledStatement) -> Self {
        self.statements.insert(statement.id.clone(), statement);
        self
    }

    pub fn result_maps(mut self, result_maps: Arc<ResultMapRegistry>) -> Self {
        self.result_maps = Some(result_maps);
        self
    }

    pub fn type_handlers(mut self, type_handlers: Arc<TypeHandlerRegistry>) -> Self {
        self.type_handlers = Some(type_handlers);
        self
    }

    pub fn namespace_cache(mut self, namespace: impl Into<String>, cache: Arc<dyn Cache<CacheKey, Value>>) -> Self {
        self.namespace_caches.insert(namespace.into(), cache);
        self
    }

    pub fn settings(mut self, settings: MapperSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Validates every `resultMap` reference and every `SelectKey` statement
    /// reference resolves, raising `Error::Configuration` otherwise — the
    /// two-pass "incomplete, retry" policy (spec §7) is internal to result
    /// map resolution and never needs to surface here since statements are
    /// registered in one pass against an already-frozen `ResultMapRegistry`.
    pub fn freeze(self) -> Result<Arc<StatementRegistry>> {
        let result_maps = self
            .result_maps
            .ok_or_else(|| Error::Configuration("statement registry requires a result map registry".to_string()))?;
        let type_handlers = self
            .type_handlers
            .ok_or_else(|| Error::Configuration("statement registry requires a type handler registry".to_string()))?;

        for statement in self.statements.values() {
            for result_map_id in &statement.result_map_ids {
                result_maps.get(result_map_id)?;
            }
            if let Some(KeyGenerator::SelectKey { statement_id, .. }) = &statement.key_generator {
                if !self.statements.contains_key(statement_id) {
                    return Err(Error::Configuration(format!(
                        "statement `{}` references unknown select-key statement `{statement_id}`",
                        statement.id
                    )));
                }
            }
        }

        Ok(Arc::new(StatementRegistry {
            statements: self.statements.into_iter().map(|(id, s)| (id, Arc::new(s))).collect(),
            result_maps,
            type_handlers,
            namespace_caches: self.namespace_caches,
            settings: self.settings,
        }))
    }
}
