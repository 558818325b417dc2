use persica_core::Value;

/// A row key (spec §4.6.2 step 2): folds the result-map id and each id
/// column's value. An empty component list (no id mappings *and* an empty
/// fallback) is the sentinel meaning "no identity" — every such row gets a
/// fresh object rather than being deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey(Vec<String>);

impl RowKey {
    pub fn build(result_map_id: &str, id_values: &[Value]) -> Self {
        let mut parts = vec![result_map_id.to_string()];
        parts.extend(id_values.iter().map(render_component));
        RowKey(parts)
    }

    /// "No identity": the id component list beyond the result-map id is
    /// empty, or every id value is null.
    pub fn is_anonymous(&self) -> bool {
        self.0.len() <= 1 || self.0[1..].iter().all(|c| c == "\u{0}null")
    }
}

fn render_component(value: &Value) -> String {
    match value {
        Value::Null => "\u{0}null".to_string(),
        other => format!("{other:?}"),
    }
}
