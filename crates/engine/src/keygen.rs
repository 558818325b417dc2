use persica_core::{BeanAccessor, Result, RowSource, Value};
use persica_mapper::Row;

/// JDBC3-style key population (spec §4.8): one generated-keys row per
/// submitted argument, in submission order; each `key_properties[i]` reads
/// column `i` of its row.
pub fn apply_jdbc3_keys(
    key_properties: &[String],
    generated_rows: &[Row],
    arguments: &mut [Value],
    bean: &dyn BeanAccessor,
) -> Result<()> {
    for (row, argument) in generated_rows.iter().zip(arguments.iter_mut()) {
        for (index, property) in key_properties.iter().enumerate() {
            let value = row.get_by_index(index)?;
            bean.set(argument, property, value)?;
        }
    }
    Ok(())
}

/// `SelectKey` result assignment (spec §4.8): the referenced statement
/// returns a single scalar row whose lone column becomes `key_property`.
pub fn apply_select_key(key_property: &str, result_row: Option<&Value>, argument: &mut Value, bean: &dyn BeanAccessor) -> Result<()> {
    let value = result_row.cloned().unwrap_or(Value::Null);
    bean.set(argument, key_property, value)
}
