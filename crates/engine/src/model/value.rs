//! Tagged dynamic-value tree used for workflow inputs and task outputs.
//!
//! Per Design Note §9 ("model as a tagged-value variant... never as
//! free-form dictionaries in typed code"), every piece of heterogeneous
//! data the engine touches at runtime (caller input, task output, template
//! lookups) goes through `Value` rather than raw `serde_json::Value`
//! sprinkled through the algorithms. `serde_json::Value` is still the wire
//! format at the DB/HTTP boundary — conversions live at the edges.

use std::collections::BTreeMap;

use serde_json::Value as Json;

/// A dynamic, typeless value — the shape every workflow input and task
/// output takes before (or instead of) a declared schema pins it down.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Arr(Vec<Value>),
    Obj(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Arr(_) => "array",
            Value::Obj(_) => "object",
        }
    }

    /// Look up a dotted path (`a.b.c`) with optional array indices
    /// (`a.b[0].c`), per §6.4's "property access on objects, index `[n]` on
    /// arrays, identity on scalars".
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for segment in split_path(path) {
            current = match segment {
                PathSegment::Field(name) => match current {
                    Value::Obj(map) => map.get(name)?,
                    _ => return None,
                },
                PathSegment::Index(i) => match current {
                    Value::Arr(items) => items.get(i)?,
                    _ => return None,
                },
            };
        }
        Some(current)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Obj(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Arr(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_whole_number(&self) -> bool {
        match self {
            Value::Int(_) => true,
            Value::Float(f) => f.fract() == 0.0,
            _ => false,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }
}

enum PathSegment<'a> {
    Field(&'a str),
    Index(usize),
}

/// Split `a.b[0].c` into `[Field("a"), Field("b"), Index(0), Field("c")]`.
fn split_path(path: &str) -> Vec<PathSegment<'_>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        while let Some(bracket_start) = rest.find('[') {
            let (field, tail) = rest.split_at(bracket_start);
            if !field.is_empty() {
                segments.push(PathSegment::Field(field));
            }
            let close = tail.find(']').unwrap_or(tail.len());
            if let Ok(idx) = tail[1..close].parse::<usize>() {
                segments.push(PathSegment::Index(idx));
            }
            rest = &tail[close.saturating_add(1).min(tail.len())..];
        }
        if !rest.is_empty() {
            segments.push(PathSegment::Field(rest));
        }
    }
    segments
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::Arr(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Obj(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for Json {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(b),
            Value::Int(i) => Json::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s),
            Value::Arr(items) => Json::Array(items.into_iter().map(Json::from).collect()),
            Value::Obj(map) => {
                Json::Object(map.into_iter().map(|(k, v)| (k, Json::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_json() {
        let json = json!({ "a": { "b": [1, 2, {"c": "x"}] }, "n": 1.5 });
        let value: Value = json.clone().into();
        let back: Json = value.into();
        assert_eq!(json, back);
    }

    #[test]
    fn get_path_supports_object_and_array_segments() {
        let value: Value = json!({ "a": { "b": [10, 20, { "c": "hi" }] } }).into();
        assert_eq!(value.get_path("a.b[2].c"), Some(&Value::Str("hi".into())));
        assert_eq!(value.get_path("a.b[0]"), Some(&Value::Int(10)));
        assert_eq!(value.get_path("a.missing"), None);
    }

    #[test]
    fn whole_number_detection() {
        assert!(Value::Int(4).is_whole_number());
        assert!(Value::Float(4.0).is_whole_number());
        assert!(!Value::Float(4.5).is_whole_number());
    }
}
