use persica_core::{Error, Result, Value};

use crate::context::EvalContext;
use crate::expr::ExprCache;
use crate::node::SqlNode;
use crate::param::{BoundSql, Direction, ParameterMapping};

struct ForeachFrame {
    item_name: Option<String>,
    item_synth: String,
    index_name: Option<String>,
    index_synth: String,
}

struct State<'a> {
    ctx: EvalContext,
    expr_cache: &'a ExprCache,
    mappings: Vec<ParameterMapping>,
    foreach_stack: Vec<ForeachFrame>,
    dynamic: bool,
}

/// `render(ast_root, argument) -> (sql_text, ordered parameter mappings,
/// bindings)` (spec §4.2).
pub fn render(root: &SqlNode, parameter: Value, database_id: Option<&str>, expr_cache: &ExprCache) -> Result<BoundSql> {
    let mut state = State {
        ctx: EvalContext::new(parameter, database_id),
        expr_cache,
        mappings: Vec::new(),
        foreach_stack: Vec::new(),
        dynamic: false,
    };
    let sql = render_node(root, &mut state)?;
    Ok(BoundSql {
        sql,
        parameter_mappings: state.mappings,
        bindings: state.ctx.snapshot_bindings(),
    })
}

fn render_node(node: &SqlNode, state: &mut State) -> Result<String> {
    match node {
        SqlNode::StaticText(text) => Ok(text.clone()),

        SqlNode::DynamicText(text) => {
            state.dynamic = true;
            substitute_dynamic(text, state)
        }

        SqlNode::If { test, child } => {
            let expr = state.expr_cache.parse(test)?;
            if expr.eval(&state.ctx)?.truthy() {
                render_node(child, state)
            } else {
                Ok(String::new())
            }
        }

        SqlNode::Choose { when, otherwise } => {
            for (test, branch) in when {
                let expr = state.expr_cache.parse(test)?;
                if expr.eval(&state.ctx)?.truthy() {
                    return render_node(branch, state);
                }
            }
            match otherwise {
                Some(branch) => render_node(branch, state),
                None => Ok(String::new()),
            }
        }

        SqlNode::Where(child) => {
            let inner = render_node(child, state)?;
            Ok(apply_where(&inner))
        }

        SqlNode::Set(child) => {
            let inner = render_node(child, state)?;
            Ok(apply_set(&inner))
        }

        SqlNode::Trim {
            child,
            prefix,
            suffix,
            prefix_overrides,
            suffix_overrides,
        } => {
            let inner = render_node(child, state)?;
            Ok(apply_trim(
                &inner,
                prefix.as_deref(),
                suffix.as_deref(),
                prefix_overrides,
                suffix_overrides,
            ))
        }

        SqlNode::ForEach {
            collection,
            item,
            index,
            open,
            close,
            separator,
            child,
        } => render_foreach(collection, item.as_deref(), index.as_deref(), open.as_deref(), close.as_deref(), separator.as_deref(), child, state),

        SqlNode::Bind { name, expr } => {
            let expr = state.expr_cache.parse(expr)?;
            let value = expr.eval(&state.ctx)?;
            state.ctx.bind(name, value);
            Ok(String::new())
        }

        SqlNode::VariableRef(mapping) => {
            let rewritten_property = rewrite_property(&mapping.property, &state.foreach_stack);
            let mapping = ParameterMapping {
                property: rewritten_property,
                ..mapping.clone()
            };
            state.mappings.push(mapping);
            Ok("?".to_string())
        }

        SqlNode::Mixed(nodes) => {
            let mut out = String::new();
            for n in nodes {
                out.push_str(&render_node(n, state)?);
            }
            Ok(out)
        }

        SqlNode::Include(id) => Err(Error::Configuration(format!(
            "unresolved <include> reference `{id}` reached the renderer; fragments must be resolved at load time"
        ))),
    }
}

fn rewrite_property(property: &str, frames: &[ForeachFrame]) -> String {
    for frame in frames.iter().rev() {
        if let Some(name) = &frame.item_name {
            if let Some(rest) = strip_binding_root(property, name) {
                return format!("{}{rest}", frame.item_synth);
            }
        }
        if let Some(name) = &frame.index_name {
            if let Some(rest) = strip_binding_root(property, name) {
                return format!("{}{rest}", frame.index_synth);
            }
        }
    }
    property.to_string()
}

fn strip_binding_root<'a>(property: &'a str, name: &str) -> Option<&'a str> {
    if property == name {
        Some("")
    } else if let Some(rest) = property.strip_prefix(name) {
        if rest.starts_with('.') || rest.starts_with('[') {
            Some(rest)
        } else {
            None
        }
    } else {
        None
    }
}

#[allow(clippy::too_many_arguments)]
fn render_foreach(
    collection: &str,
    item: Option<&str>,
    index: Option<&str>,
    open: Option<&str>,
    close: Option<&str>,
    separator: Option<&str>,
    child: &SqlNode,
    state: &mut State,
) -> Result<String> {
    let expr = state.expr_cache.parse(collection)?;
    let resolved = expr.eval(&state.ctx)?;
    let entries = resolve_iterable(&resolved)?;

    if entries.is_empty() {
        return Ok(String::new());
    }

    let mut out = String::new();
    if let Some(open) = open {
        out.push_str(open);
    }
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            if let Some(sep) = separator {
                out.push_str(sep);
            }
        }
        let n = state.ctx.next_unique();
        let item_synth = format!("__frch_item_{n}");
        let index_synth = format!("__frch_index_{n}");
        state.ctx.bind(&item_synth, value.clone());
        state.ctx.bind(&index_synth, key.clone());

        state.ctx.push_scope();
        if let Some(item_name) = item {
            state.ctx.bind_scoped(item_name, value);
        }
        if let Some(index_name) = index {
            state.ctx.bind_scoped(index_name, key);
        }
        state.foreach_stack.push(ForeachFrame {
            item_name: item.map(str::to_string),
            item_synth,
            index_name: index.map(str::to_string),
            index_synth,
        });

        let rendered = render_node(child, state);

        state.foreach_stack.pop();
        state.ctx.pop_scope();
        out.push_str(&rendered?);
    }
    if let Some(close) = close {
        out.push_str(close);
    }
    Ok(out)
}

fn resolve_iterable(value: &Value) -> Result<Vec<(Value, Value)>> {
    match value {
        Value::List(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::I64(i as i64), v.clone()))
            .collect()),
        Value::Map(map) => Ok(map
            .iter()
            .map(|(k, v)| (Value::from(k.as_str()), v.clone()))
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(Error::Render(format!(
            "expected an iterable for <foreach collection>, got {other:?}"
        ))),
    }
}

/// Scans `text` for `${token}` and substitutes each with the literal
/// rendering of the evaluated expression (spec §4.2's `DynamicText`).
fn substitute_dynamic(text: &str, state: &mut State) -> Result<String> {
    let mut out = String::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(Error::Render(format!("unterminated ${{...}} in `{text}`")));
        };
        let token = &after[..end];
        let expr = state.expr_cache.parse(token)?;
        let value = expr.eval(&state.ctx)?;
        out.push_str(&literal_text(&value)?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn literal_text(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::I64(i) => i.to_string(),
        Value::F64(f) => f.to_string(),
        Value::Str(s) => s.to_string(),
        other => {
            return Err(Error::Render(format!(
                "${{...}} substitution requires a simple type, got {other:?}"
            )))
        }
    })
}

fn apply_where(inner: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let stripped = strip_leading_ignore_case(trimmed, &["AND ", "OR "]);
    format!("WHERE {}", stripped.trim_start())
}

fn apply_set(inner: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let stripped = trimmed.strip_suffix(',').unwrap_or(trimmed);
    format!("SET {}", stripped.trim_end())
}

fn apply_trim(
    inner: &str,
    prefix: Option<&str>,
    suffix: Option<&str>,
    prefix_overrides: &[String],
    suffix_overrides: &[String],
) -> String {
    let mut trimmed = inner.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    trimmed = strip_leading_ignore_case(trimmed, prefix_overrides).trim_start();
    trimmed = strip_trailing_ignore_case(trimmed, suffix_overrides).trim_end();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    if let Some(p) = prefix {
        out.push_str(p);
    }
    out.push_str(trimmed);
    if let Some(s) = suffix {
        out.push_str(s);
    }
    out
}

fn strip_leading_ignore_case<'a>(text: &'a str, candidates: &[impl AsRef<str>]) -> &'a str {
    for candidate in candidates {
        let candidate = candidate.as_ref();
        if text.len() >= candidate.len() && text[..candidate.len()].eq_ignore_ascii_case(candidate) {
            return &text[candidate.len()..];
        }
    }
    text
}

fn strip_trailing_ignore_case<'a>(text: &'a str, candidates: &[impl AsRef<str>]) -> &'a str {
    for candidate in candidates {
        let candidate = candidate.as_ref();
        if text.len() >= candidate.len()
            && text[text.len() - candidate.len()..].eq_ignore_ascii_case(candidate)
        {
            return &text[..text.len() - candidate.len()];
        }
    }
    text
}

impl ParameterMapping {
    pub fn is_out(&self) -> bool {
        matches!(self.mode, Direction::Out | Direction::InOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::SqlNode;
    use crate::param::ParameterMapping;
    use persica_helpers::IndexMap;
    use pretty_assertions::assert_eq;

    fn var(prop: &str) -> SqlNode {
        SqlNode::VariableRef(ParameterMapping::simple(prop))
    }

    /// S1 — Dynamic where.
    #[test]
    fn s1_dynamic_where() {
        let ast = SqlNode::Mixed(vec![
            SqlNode::StaticText("SELECT * FROM u ".to_string()),
            SqlNode::Where(Box::new(SqlNode::Mixed(vec![
                SqlNode::If {
                    test: "name != null".to_string(),
                    child: Box::new(SqlNode::Mixed(vec![
                        SqlNode::StaticText("AND name = ".to_string()),
                        var("name"),
                    ])),
                },
                SqlNode::If {
                    test: "age > 0".to_string(),
                    child: Box::new(SqlNode::Mixed(vec![
                        SqlNode::StaticText(" AND age = ".to_string()),
                        var("age"),
                    ])),
                },
            ]))),
        ]);

        let mut arg = IndexMap::default();
        arg.insert("name".to_string(), Value::from("a"));
        arg.insert("age".to_string(), Value::I64(0));

        let cache = ExprCache::new();
        let bound = render(&ast, Value::Map(arg), None, &cache).unwrap();
        assert_eq!(bound.sql, "SELECT * FROM u WHERE name = ?");
        assert_eq!(bound.parameter_mappings.len(), 1);
        assert_eq!(bound.parameter_mappings[0].property, "name");
    }

    /// S2 — ForEach IN clause.
    #[test]
    fn s2_foreach_in_clause() {
        let ast = SqlNode::Mixed(vec![
            SqlNode::StaticText("DELETE FROM t WHERE id IN ".to_string()),
            SqlNode::ForEach {
                collection: "ids".to_string(),
                item: Some("i".to_string()),
                index: None,
                open: Some("(".to_string()),
                close: Some(")".to_string()),
                separator: Some(",".to_string()),
                child: Box::new(var("i")),
            },
        ]);
        let mut arg = IndexMap::default();
        arg.insert(
            "ids".to_string(),
            Value::List(vec![Value::I64(1), Value::I64(2), Value::I64(3)]),
        );
        let cache = ExprCache::new();
        let bound = render(&ast, Value::Map(arg), None, &cache).unwrap();
        assert_eq!(bound.sql, "DELETE FROM t WHERE id IN (?,?,?)");
        assert_eq!(bound.parameter_mappings.len(), 3);
        for (i, mapping) in bound.parameter_mappings.iter().enumerate() {
            let synth_value = bound.bindings.get(&mapping.property).unwrap();
            assert_eq!(*synth_value, Value::I64((i + 1) as i64));
        }
    }

    #[test]
    fn empty_foreach_emits_nothing() {
        let ast = SqlNode::ForEach {
            collection: "ids".to_string(),
            item: Some("i".to_string()),
            index: None,
            open: Some("(".to_string()),
            close: Some(")".to_string()),
            separator: Some(",".to_string()),
            child: Box::new(var("i")),
        };
        let mut arg = IndexMap::default();
        arg.insert("ids".to_string(), Value::List(vec![]));
        let cache = ExprCache::new();
        let bound = render(&ast, Value::Map(arg), None, &cache).unwrap();
        assert_eq!(bound.sql, "");
    }

    #[test]
    fn where_never_emits_leading_and_or() {
        let ast = SqlNode::Where(Box::new(SqlNode::StaticText("OR x = 1".to_string())));
        let cache = ExprCache::new();
        let bound = render(&ast, Value::Null, None, &cache).unwrap();
        assert_eq!(bound.sql, "WHERE x = 1");
    }

    #[test]
    fn trim_empty_child_yields_empty_output() {
        let ast = SqlNode::Trim {
            child: Box::new(SqlNode::StaticText("   ".to_string())),
            prefix: Some("(".to_string()),
            suffix: Some(")".to_string()),
            prefix_overrides: vec![],
            suffix_overrides: vec![],
        };
        let cache = ExprCache::new();
        let bound = render(&ast, Value::Null, None, &cache).unwrap();
        assert_eq!(bound.sql, "");
    }

    #[test]
    fn set_strips_trailing_comma() {
        let ast = SqlNode::Set(Box::new(SqlNode::Mixed(vec![
            SqlNode::StaticText("name = ".to_string()),
            var("name"),
            SqlNode::StaticText(",".to_string()),
        ])));
        let mut arg = IndexMap::default();
        arg.insert("name".to_string(), Value::from("a"));
        let cache = ExprCache::new();
        let bound = render(&ast, Value::Map(arg), None, &cache).unwrap();
        assert_eq!(bound.sql, "SET name = ?");
    }

    #[test]
    fn rerendering_produced_sql_is_idempotent() {
        // invariant 1: re-rendering the produced SQL (now all-static) over
        // the same argument yields the same SQL and parameter list.
        let ast = SqlNode::Mixed(vec![SqlNode::StaticText("SELECT 1".to_string())]);
        let cache = ExprCache::new();
        let first = render(&ast, Value::Null, None, &cache).unwrap();
        let as_static = SqlNode::StaticText(first.sql.clone());
        let second = render(&as_static, Value::Null, None, &cache).unwrap();
        assert_eq!(first.sql, second.sql);
        assert_eq!(first.parameter_mappings, second.parameter_mappings);
    }

    #[test]
    fn every_question_mark_has_one_mapping_at_same_ordinal() {
        let ast = SqlNode::Mixed(vec![
            SqlNode::StaticText("INSERT INTO t VALUES (".to_string()),
            var("a"),
            SqlNode::StaticText(", ".to_string()),
            var("b"),
            SqlNode::StaticText(")".to_string()),
        ]);
        let mut arg = IndexMap::default();
        arg.insert("a".to_string(), Value::I64(1));
        arg.insert("b".to_string(), Value::I64(2));
        let cache = ExprCache::new();
        let bound = render(&ast, Value::Map(arg), None, &cache).unwrap();
        assert_eq!(bound.sql.matches('?').count(), bound.parameter_mappings.len());
    }
}
