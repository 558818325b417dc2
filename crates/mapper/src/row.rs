use persica_core::{Error, Result, RowSource, Value};
use persica_helpers::IndexMap;

/// One fetched row, column-ordered (spec §3's result-set traversal). Stands
/// in for a live cursor/`ResultSet` handle: the driver binding is expected
/// to produce these eagerly per row, which keeps the mapper itself free of
/// any JDBC-shaped cursor API.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl RowSource for Row {
    fn get_by_name(&self, column: &str) -> Result<Value> {
        Ok(self.columns.get(column).cloned().unwrap_or(Value::Null))
    }

    fn get_by_index(&self, index: usize) -> Result<Value> {
        self.columns
            .get_index(index)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Error::Mapping(format!("column index {index} out of range")))
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Result<String> {
        self.columns
            .get_index(index)
            .map(|(k, _)| k.clone())
            .ok_or_else(|| Error::Mapping(format!("column index {index} out of range")))
    }
}
