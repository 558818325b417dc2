use std::cell::Cell;

use persica_core::Value;

/// Evaluation context for a single render pass (spec §4.2): holds the
/// caller argument under `_parameter`, `_databaseId`, named bindings from
/// `<bind>`, and the `ForEach` uniqueness counter. Scopes pushed by
/// `ForEach` shadow outer bindings for the duration of one iteration.
pub struct EvalContext {
    globals: ahash::AHashMap<String, Value>,
    scopes: Vec<ahash::AHashMap<String, Value>>,
    unique: Cell<u64>,
}

impl EvalContext {
    pub fn new(parameter: Value, database_id: Option<&str>) -> Self {
        let mut globals = ahash::AHashMap::default();
        globals.insert("_parameter".to_string(), parameter);
        globals.insert(
            "_databaseId".to_string(),
            database_id.map(Value::from).unwrap_or(Value::Null),
        );
        Self {
            globals,
            scopes: Vec::new(),
            unique: Cell::new(0),
        }
    }

    pub fn parameter(&self) -> &Value {
        self.globals.get("_parameter").unwrap_or(&Value::Null)
    }

    /// Binds a name for the remainder of the render (as `<bind>` does).
    pub fn bind(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(ahash::AHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn bind_scoped(&mut self, name: &str, value: Value) {
        if let Some(top) = self.scopes.last_mut() {
            top.insert(name.to_string(), value);
        } else {
            self.bind(name, value);
        }
    }

    pub fn next_unique(&self) -> u64 {
        let n = self.unique.get();
        self.unique.set(n + 1);
        n
    }

    /// Everything bound for the render's lifetime (`<bind>` names and the
    /// per-iteration `ForEach` synthetic names), excluding the two reserved
    /// context keys. This is what the Parameter Binder consults in addition
    /// to the caller argument itself (spec §4.3).
    pub fn snapshot_bindings(&self) -> ahash::AHashMap<String, Value> {
        self.globals
            .iter()
            .filter(|(k, _)| k.as_str() != "_parameter" && k.as_str() != "_databaseId")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Resolves a dotted path. The first segment is looked up against
    /// innermost-to-outermost scopes and then the globals (covering
    /// `<bind>` names and `_parameter`/`_databaseId` themselves); if the
    /// first segment isn't a known binding at all, the whole path is
    /// resolved as a property of `_parameter`, matching how a bare `age` in
    /// `test="age > 0"` reaches into the caller argument's own properties.
    pub fn resolve_path(&self, path: &str) -> Value {
        let first = path.split(['.', '[']).next().unwrap_or(path);

        for scope in self.scopes.iter().rev() {
            if let Some(root) = scope.get(first) {
                return navigate_rest(root, path, first);
            }
        }
        if let Some(root) = self.globals.get(first) {
            return navigate_rest(root, path, first);
        }
        self.parameter()
            .navigate(path)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

fn navigate_rest(root: &Value, full_path: &str, first: &str) -> Value {
    let rest = &full_path[first.len()..];
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    if rest.is_empty() {
        return root.clone();
    }
    // `rest` may still carry a leading index directly on the root, e.g.
    // `item[0]`; `Value::navigate` handles an empty-name leading segment by
    // indexing into the current value, so this falls out of the general case.
    root.navigate(rest).cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_binding_shadows_global() {
        let mut ctx = EvalContext::new(Value::Map(Default::default()), None);
        ctx.bind("item", Value::I64(1));
        ctx.push_scope();
        ctx.bind_scoped("item", Value::I64(2));
        assert_eq!(ctx.resolve_path("item"), Value::I64(2));
        ctx.pop_scope();
        assert_eq!(ctx.resolve_path("item"), Value::I64(1));
    }

    #[test]
    fn unique_counter_increments() {
        let ctx = EvalContext::new(Value::Null, None);
        assert_eq!(ctx.next_unique(), 0);
        assert_eq!(ctx.next_unique(), 1);
    }
}
