use std::sync::Arc;

use persica_helpers::IndexMap;
use persica_core::{Error, Result};

/// Global auto-mapping behavior (spec §4.6.1 step 3). A `ResultMap` may
/// override this per-map via `auto_mapping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoMappingBehavior {
    /// Disables auto-mapping entirely.
    None,
    /// Auto-maps non-nested maps only.
    #[default]
    Partial,
    /// Auto-maps nested maps too.
    Full,
}

/// Per-map override of the global auto-mapping setting; `Inherit` defers to
/// `MapperSettings::auto_mapping_behavior`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoMapping {
    #[default]
    Inherit,
    Behavior(AutoMappingBehavior),
}

/// Settings read from the (external) configuration loader that affect row
/// processing globally (spec §4.6.1/§4.6.2).
#[derive(Debug, Clone)]
pub struct MapperSettings {
    pub auto_mapping_behavior: AutoMappingBehavior,
    pub map_underscore_to_camel_case: bool,
    pub call_setters_on_nulls: bool,
    pub return_instance_for_empty_row: bool,
    pub safe_row_bounds: bool,
}

impl Default for MapperSettings {
    fn default() -> Self {
        Self {
            auto_mapping_behavior: AutoMappingBehavior::default(),
            map_underscore_to_camel_case: false,
            call_setters_on_nulls: false,
            return_instance_for_empty_row: false,
            safe_row_bounds: false,
        }
    }
}

/// What a single non-constructor mapping resolves through beyond a direct
/// column read (spec §3: "a mapping may nest").
#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    /// `select` — another compiled statement supplies the value.
    SubQuery {
        statement_id: String,
        /// Ordered (row-column, argument-name) pairs used to build the
        /// sub-query's argument; a single pair collapses to a scalar
        /// argument rather than a named mapping.
        column_params: Vec<(String, String)>,
        lazy: bool,
    },
    /// `resultMap` — inline object composition.
    ResultMap {
        result_map_id: String,
        column_prefix: Option<String>,
        not_null_columns: Vec<String>,
        /// Whether the outer property is a collection (append) or a
        /// singular reference (assign) — spec §4.6.2 step 4.
        is_collection: bool,
    },
}

/// One column-to-property mapping, or one constructor argument when held in
/// `ResultMap::constructor_args` (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub property: String,
    pub column: Option<String>,
    pub host_type: Option<String>,
    pub column_type: Option<String>,
    pub type_handler: Option<String>,
    pub nested: Option<Nested>,
    pub is_id: bool,
}

impl Mapping {
    pub fn simple(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            column: Some(column.into()),
            host_type: None,
            column_type: None,
            type_handler: None,
            nested: None,
            is_id: false,
        }
    }

    pub fn id(mut self) -> Self {
        self.is_id = true;
        self
    }

    pub fn nested(mut self, nested: Nested) -> Self {
        self.nested = Some(nested);
        self
    }
}

/// Value → branch result-map id mapping, keyed by the discriminator
/// column's value rendered as a string (spec §3/§4.6.1 step 1).
#[derive(Debug, Clone, PartialEq)]
pub struct Discriminator {
    pub column: String,
    pub cases: IndexMap<String, String>,
    pub default: Option<String>,
}

impl Discriminator {
    pub fn branch_for(&self, column_value: &str) -> Option<&str> {
        self.cases
            .get(column_value)
            .map(String::as_str)
            .or(self.default.as_deref())
    }
}

/// Immutable Result Map tree (spec §3). Built via configuration, then held
/// read-only in a `ResultMapRegistry`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMap {
    pub id: String,
    pub target_type: String,
    pub mappings: Vec<Mapping>,
    pub constructor_args: Vec<Mapping>,
    pub discriminator: Option<Discriminator>,
    pub auto_mapping: AutoMapping,
}

impl ResultMap {
    pub fn new(id: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target_type: target_type.into(),
            mappings: Vec::new(),
            constructor_args: Vec::new(),
            discriminator: None,
            auto_mapping: AutoMapping::Inherit,
        }
    }

    pub fn with_mappings(mut self, mappings: Vec<Mapping>) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_constructor_args(mut self, args: Vec<Mapping>) -> Self {
        self.constructor_args = args;
        self
    }

    pub fn with_discriminator(mut self, discriminator: Discriminator) -> Self {
        self.discriminator = Some(discriminator);
        self
    }

    /// Id mappings drive row-key computation (spec §4.6.2 step 2); falls
    /// back to all non-constructor mappings when the map declares none.
    pub fn id_mappings(&self) -> Vec<&Mapping> {
        let ids: Vec<&Mapping> = self.mappings.iter().filter(|m| m.is_id).collect();
        if ids.is_empty() {
            self.mappings.iter().collect()
        } else {
            ids
        }
    }

    pub fn effective_auto_mapping(&self, global: AutoMappingBehavior) -> AutoMappingBehavior {
        match self.auto_mapping {
            AutoMapping::Inherit => global,
            AutoMapping::Behavior(b) => b,
        }
    }

    pub fn has_constructor(&self) -> bool {
        !self.constructor_args.is_empty()
    }
}

/// Build-then-freeze registry of result maps, owned by the Statement
/// Registry at runtime (spec §3 ownership: "shared-immutable, owned by the
/// Statement Registry").
pub struct ResultMapRegistry {
    maps: IndexMap<String, Arc<ResultMap>>,
}

impl ResultMapRegistry {
    pub fn get(&self, id: &str) -> Result<Arc<ResultMap>> {
        self.maps
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("unknown result map `{id}`")))
    }
}

#[derive(Default)]
pub struct ResultMapRegistryBuilder {
    maps: IndexMap<String, Arc<ResultMap>>,
}

impl ResultMapRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, map: ResultMap) -> Self {
        self.maps.insert(map.id.clone(), Arc::new(map));
        self
    }

    /// Validates every discriminator branch and nested-result-map reference
    /// resolves, and that no mapping sets both `select` and `resultMap`
    /// (spec §3 invariant); raises `ConfigurationError` otherwise.
    pub fn freeze(self) -> Result<Arc<ResultMapRegistry>> {
        for map in self.maps.values() {
            for mapping in map.mappings.iter().chain(map.constructor_args.iter()) {
                if let Some(Nested::ResultMap { result_map_id, .. }) = &mapping.nested {
                    if !self.maps.contains_key(result_map_id) {
                        return Err(Error::Configuration(format!(
                            "result map `{}` references unknown nested result map `{result_map_id}`",
                            map.id
                        )));
                    }
                }
            }
            if let Some(discriminator) = &map.discriminator {
                for branch in discriminator.cases.values().chain(discriminator.default.iter()) {
                    if !self.maps.contains_key(branch) {
                        return Err(Error::Configuration(format!(
                            "result map `{}` discriminator references unknown branch `{branch}`",
                            map.id
                        )));
                    }
                }
            }
        }
        Ok(Arc::new(ResultMapRegistry { maps: self.maps }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_rejects_dangling_discriminator_branch() {
        let map = ResultMap::new("T", "Thing").with_discriminator(Discriminator {
            column: "kind".into(),
            cases: IndexMap::from_iter([("A".to_string(), "TA".to_string())]),
            default: None,
        });
        let err = ResultMapRegistryBuilder::new().register(map).freeze().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn id_mappings_fall_back_to_all_mappings() {
        let map = ResultMap::new("T", "Thing")
            .with_mappings(vec![Mapping::simple("name", "name")]);
        assert_eq!(map.id_mappings().len(), 1);
    }
}
