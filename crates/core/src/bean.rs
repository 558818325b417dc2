use crate::error::Result;
use crate::value::Value;

/// External collaborator (spec §6): reflective or code-generated property
/// access over user-defined host types. The statement-execution pipeline
/// never inspects host-language runtime type information beyond this
/// capability.
///
/// A production embedding supplies its own implementation (derive macro,
/// schema-driven codegen, or genuine reflection); `persica` ships a
/// `Value`-native implementation (`ValueBean`) good enough to drive the
/// pipeline end to end against its own host representation.
pub trait BeanAccessor: Send + Sync {
    /// Creates a fresh instance of `type_name`, optionally via a constructor
    /// selected by `arg_types` and invoked with `args`. An empty `arg_types`
    /// requests the no-arg constructor.
    fn create(&self, type_name: &str, arg_types: &[&str], args: &[Value]) -> Result<Value>;

    /// Reads a dotted property path off `object`.
    fn get(&self, object: &Value, property: &str) -> Result<Value>;

    /// Writes `value` at a dotted property path on `object`.
    fn set(&self, object: &mut Value, property: &str, value: Value) -> Result<()>;

    fn has_setter(&self, type_name: &str, property: &str) -> bool;

    fn is_collection(&self, type_name: &str) -> bool;
}

/// A `BeanAccessor` over `persica_core::Value` itself: maps are objects,
/// lists are collections. Sufficient to exercise the pipeline without a
/// host-language code-generation layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueBean;

impl BeanAccessor for ValueBean {
    fn create(&self, type_name: &str, _arg_types: &[&str], args: &[Value]) -> Result<Value> {
        match type_name {
            "map" | "" => Ok(Value::Map(Default::default())),
            "list" => Ok(Value::List(args.to_vec())),
            _ => Ok(Value::Map(Default::default())),
        }
    }

    fn get(&self, object: &Value, property: &str) -> Result<Value> {
        Ok(object.navigate(property).cloned().unwrap_or(Value::Null))
    }

    fn set(&self, object: &mut Value, property: &str, value: Value) -> Result<()> {
        let Value::Map(map) = object else {
            return Err(crate::error::Error::Mapping(format!(
                "cannot set property `{property}` on a non-map value"
            )));
        };
        set_dotted(map, property, value);
        Ok(())
    }

    fn has_setter(&self, _type_name: &str, _property: &str) -> bool {
        true
    }

    fn is_collection(&self, type_name: &str) -> bool {
        type_name == "list" || type_name == "collection"
    }
}

fn set_dotted(map: &mut persica_helpers::IndexMap<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Map(Default::default()));
            if let Value::Map(inner) = entry {
                set_dotted(inner, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let accessor = ValueBean;
        let mut obj = Value::Map(Default::default());
        accessor.set(&mut obj, "name", Value::from("a")).unwrap();
        accessor
            .set(&mut obj, "address.city", Value::from("nyc"))
            .unwrap();
        assert_eq!(accessor.get(&obj, "name").unwrap(), Value::from("a"));
        assert_eq!(
            accessor.get(&obj, "address.city").unwrap(),
            Value::from("nyc")
        );
    }
}
