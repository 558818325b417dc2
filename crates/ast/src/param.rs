use persica_core::{Error, Result, Value};

/// Binder direction for a parameter mapping (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// Immutable parameter mapping (spec §3): produced both at load time for
/// `#{...}` tokens and during dynamic rendering (`ForEach` synthesizes one
/// per rewritten reference).
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMapping {
    pub property: String,
    pub java_type: Option<String>,
    pub jdbc_type: Option<String>,
    pub type_handler: Option<String>,
    pub numeric_scale: Option<i32>,
    pub mode: Direction,
    pub result_map_id: Option<String>,
}

impl ParameterMapping {
    pub fn simple(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            java_type: None,
            jdbc_type: None,
            type_handler: None,
            numeric_scale: None,
            mode: Direction::In,
            result_map_id: None,
        }
    }
}

/// Parses a raw `#{property,javaType=...,jdbcType=...,typeHandler=...,
/// numericScale=...,mode=...}` payload (the text between the braces) into a
/// `ParameterMapping`, at load time (spec §4.2).
pub fn parse_variable_spec(raw: &str) -> Result<ParameterMapping> {
    let mut parts = raw.split(',');
    let property = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Configuration(format!("empty property in `#{{{raw}}}`")))?
        .to_string();

    let mut mapping = ParameterMapping::simple(property);
    for part in parts {
        let part = part.trim();
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "javaType" => mapping.java_type = Some(value.to_string()),
            "jdbcType" => mapping.jdbc_type = Some(value.to_string()),
            "typeHandler" => mapping.type_handler = Some(value.to_string()),
            "numericScale" => {
                mapping.numeric_scale = Some(value.parse().map_err(|_| {
                    Error::Configuration(format!("invalid numericScale `{value}` in `#{{{raw}}}`"))
                })?)
            }
            "mode" => {
                mapping.mode = match value {
                    "IN" => Direction::In,
                    "OUT" => Direction::Out,
                    "INOUT" => Direction::InOut,
                    other => {
                        return Err(Error::Configuration(format!(
                            "unknown parameter mode `{other}` in `#{{{raw}}}`"
                        )))
                    }
                }
            }
            "resultMap" => mapping.result_map_id = Some(value.to_string()),
            other => {
                return Err(Error::Configuration(format!(
                    "unknown attribute `{other}` in `#{{{raw}}}`"
                )))
            }
        }
    }
    Ok(mapping)
}

/// The rendered product of §4.2's `render` contract: the final SQL text, the
/// ordered parameter mappings at the `?` ordinals they correspond to, and
/// the named bindings accumulated from `<bind>` (exposed for introspection
/// and testing, not consumed downstream).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundSql {
    pub sql: String,
    pub parameter_mappings: Vec<ParameterMapping>,
    pub bindings: ahash::AHashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_property() {
        let m = parse_variable_spec("name").unwrap();
        assert_eq!(m.property, "name");
        assert_eq!(m.jdbc_type, None);
    }

    #[test]
    fn parses_hints() {
        let m = parse_variable_spec("age,jdbcType=INTEGER,javaType=int,mode=OUT").unwrap();
        assert_eq!(m.property, "age");
        assert_eq!(m.jdbc_type.as_deref(), Some("INTEGER"));
        assert_eq!(m.java_type.as_deref(), Some("int"));
        assert_eq!(m.mode, Direction::Out);
    }
}
