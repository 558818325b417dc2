use persica_helpers::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Host-neutral value flowing through expression evaluation, parameter
/// binding, and row mapping.
///
/// Stands in for whatever a real embedding's Bean Accessor would otherwise
/// produce by reflection; the pipeline never inspects a host language's
/// runtime type information directly.
///
/// `Serialize`/`Deserialize` make it usable as the value type of a
/// `persica-cache` namespace chain, whose `Serialized` decorator round-trips
/// through `serde_json` for snapshot isolation (spec §4.4).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(SmolStr),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness per the expression language (spec §4.2.1): booleans are
    /// themselves, numbers are truthy iff non-zero, any other non-null value
    /// is truthy, null is falsy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::I64(i) => *i != 0,
            Value::F64(f) => *f != 0.0,
            Value::Str(_) | Value::Bytes(_) | Value::List(_) | Value::Map(_) => true,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(i) => Some(*i),
            Value::F64(f) => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(i) => Some(*i as f64),
            Value::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Navigate a dotted property path (`a.b.c`), each segment optionally
    /// carrying an index (`a[0]`, `items[2]`). A missing segment yields
    /// `None` rather than an error; callers decide whether that is fatal.
    pub fn navigate(&self, path: &str) -> Option<&Value> {
        if path == "_parameter" || path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for segment in path.split('.') {
            current = navigate_segment(current, segment)?;
        }
        Some(current)
    }
}

fn navigate_segment<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    let (name, indices) = parse_segment(segment);
    let mut current = if name.is_empty() {
        value
    } else {
        match value {
            Value::Map(m) => m.get(name)?,
            _ => return None,
        }
    };
    for idx in indices {
        current = match current {
            Value::List(l) => l.get(idx)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Splits `name[0][1]` into (`name`, [0, 1]).
fn parse_segment(segment: &str) -> (&str, Vec<usize>) {
    let Some(bracket) = segment.find('[') else {
        return (segment, Vec::new());
    };
    let name = &segment[..bracket];
    let mut indices = Vec::new();
    let mut rest = &segment[bracket..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        let token = stripped[..close].trim_matches(|c| c == '\'' || c == '"');
        if let Ok(idx) = token.parse::<usize>() {
            indices.push(idx);
        }
        rest = &stripped[close + 1..];
    }
    (name, indices)
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(SmolStr::new(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(SmolStr::new(v))
    }
}
