use super::value::Value;
use std::collections::HashMap;

/// The named values an expression can reference (`spec.md` §4.5) — request
/// and response context, the forwarded body, and (for streaming responses)
/// the accumulated SSE text under `allData`.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    vars: HashMap<String, Value>,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Value {
        self.vars.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variable_resolves_to_null() {
        let b = Binding::new();
        assert_eq!(b.get("missing"), Value::Null);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut b = Binding::new();
        b.set("body", Value::String("hi".into()));
        assert_eq!(b.get("body"), Value::String("hi".into()));
    }
}
