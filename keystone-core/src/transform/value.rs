use std::collections::HashMap;

/// Runtime value produced/consumed by the expression evaluator. Grounded on
/// `penserai-acteon/acteon-rules`'s `Value` enum architecture, carrying JSON
/// shape plus the conversions the closed builtin list in `spec.md` §4.5 needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => Value::List(arr.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => {
                serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }

    /// Null, empty string, empty list, empty map, and zero numbers are falsy;
    /// everything else (including `Bool(false)`'s numeric non-zero cousins) is
    /// truthy. Used by `??`, `coalesce`, and `default`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    pub fn is_null_or_empty(&self) -> bool {
        matches!(self, Value::Null) || !self.is_truthy()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// String coercion used by `toString`/`EvalString`.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
        }
    }

    pub fn field(&self, name: &str) -> Value {
        match self {
            Value::Map(map) => map.get(name).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    pub fn index(&self, idx: i64) -> Value {
        match self {
            Value::List(items) => {
                let len = items.len() as i64;
                let i = if idx < 0 { len + idx } else { idx };
                if i < 0 || i >= len {
                    Value::Null
                } else {
                    items[i as usize].clone()
                }
            }
            _ => Value::Null,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_converts_every_variant() {
        let json: serde_json::Value = serde_json::json!({
            "a": 1, "b": 1.5, "c": "x", "d": true, "e": null, "f": [1, 2]
        });
        let v = Value::from_json(json);
        assert_eq!(v.field("a"), Value::Int(1));
        assert_eq!(v.field("b"), Value::Float(1.5));
        assert_eq!(v.field("c"), Value::String("x".into()));
        assert_eq!(v.field("d"), Value::Bool(true));
        assert_eq!(v.field("e"), Value::Null);
        assert_eq!(v.field("f"), Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn round_trips_through_json() {
        let original = serde_json::json!({"usage": {"tokens": 42}, "ok": true});
        let v = Value::from_json(original.clone());
        assert_eq!(v.to_json(), original);
    }

    #[test]
    fn falsy_values() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
    }

    #[test]
    fn index_supports_negative_wraparound() {
        let list = Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        assert_eq!(list.index(-1), Value::Int(30));
        assert_eq!(list.index(0), Value::Int(10));
        assert_eq!(list.index(5), Value::Null);
    }

    #[test]
    fn field_on_non_map_is_null_not_error() {
        assert_eq!(Value::Int(1).field("x"), Value::Null);
    }
}
