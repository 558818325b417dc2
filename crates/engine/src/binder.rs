use persica_ast::{BoundSql, ParameterMapping};
use persica_core::{resolve_named, BeanAccessor, CacheKey, ParamSink, Result, TypeHandlerRegistry, Value};
use persica_mapper::RowBounds;

/// Given a prepared/callable statement's sink, the rendered parameter
/// mappings, and the argument object, binds each mapping in ordinal order
/// (spec §4.3).
pub fn bind_parameters(
    sink: &mut dyn ParamSink,
    bound: &BoundSql,
    argument: &Value,
    bean: &dyn BeanAccessor,
    type_handlers: &TypeHandlerRegistry,
    jdbc_type_for_null: &str,
) -> Result<()> {
    for (ordinal, mapping) in bound.parameter_mappings.iter().enumerate() {
        let value = resolve_argument(mapping, bound, argument, bean);
        let handler = if let Some(name) = &mapping.type_handler {
            resolve_named(type_handlers, name)?
        } else {
            type_handlers.resolve(mapping.java_type.as_deref().unwrap_or(""), mapping.jdbc_type.as_deref())
        };
        let column_type = if value.is_null() {
            mapping.jdbc_type.as_deref().unwrap_or(jdbc_type_for_null)
        } else {
            mapping.jdbc_type.as_deref().unwrap_or("")
        };
        handler.set(sink, ordinal, &value, column_type)?;
    }
    Ok(())
}

/// Resolves a single mapping's value: a bare `_parameter` path against a
/// non-map argument reads it directly, rather than through the bean
/// accessor's property-path navigation (spec §4.3's "if the argument is a
/// single simple value and the mapping path is `_parameter`, use it
/// directly"). Otherwise the caller argument is consulted first; a mapping
/// whose property isn't a path on `argument` at all — `<foreach>`'s
/// synthetic `__frch_item_N` properties, `<bind>`'s named bindings — falls
/// back to `bound.bindings`, the snapshot of the eval context those
/// constructs populate (context.rs's "what the Parameter Binder consults in
/// addition to the caller argument").
fn resolve_argument(mapping: &ParameterMapping, bound: &BoundSql, argument: &Value, bean: &dyn BeanAccessor) -> Value {
    if mapping.property == "_parameter" && !matches!(argument, Value::Map(_)) {
        return argument.clone();
    }
    match bean.get(argument, &mapping.property) {
        Ok(value) if value != Value::Null => value,
        _ => bound.bindings.get(&mapping.property).cloned().unwrap_or(Value::Null),
    }
}

/// Every bound parameter's resolved value, in ordinal order — the values an
/// executor folds into its cache key alongside the statement id, row
/// bounds, and rendered SQL (spec §4.7's `createCacheKey`).
pub fn resolve_parameter_values(bound: &BoundSql, argument: &Value, bean: &dyn BeanAccessor) -> Vec<Value> {
    bound
        .parameter_mappings
        .iter()
        .map(|mapping| resolve_argument(mapping, bound, argument, bean))
        .collect()
}

/// Builds the Executor's local/second-level cache key (spec §4.7:
/// "statement id, row bounds, rendered SQL text, and each bound parameter
/// value, in order").
pub fn create_cache_key(
    statement_id: &str,
    bound: &BoundSql,
    argument: &Value,
    bean: &dyn BeanAccessor,
    bounds: RowBounds,
) -> CacheKey {
    let mut key = CacheKey::new()
        .update(statement_id)
        .update(bounds.offset as i64)
        .update(bounds.limit as i64)
        .update(bound.sql.as_str());
    for value in resolve_parameter_values(bound, argument, bean) {
        key = key.update(value);
    }
    key
}
