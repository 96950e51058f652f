//! Expression engine and request/response transform application
//! (`spec.md` §4.5), grounded architecturally on
//! `penserai-acteon/acteon-rules`'s `Expr`/`Value`/`eval` split, with a
//! hand-written lexer/parser since expressions here arrive as route-
//! configured source text rather than pre-built rule trees.

mod binding;
mod builtins;
mod engine;
mod expr;
mod lexer;
mod parser;
mod sse;
mod value;

pub use binding::Binding;
pub use engine::{ExpressionEngine, TransformError};
pub use value::Value;

use std::collections::HashMap;

use crate::route::Transform;

/// Apply a `Transform` to headers, a raw query string, and a parsed JSON
/// body. Deletions run before sets, per `spec.md` §4.5; each `set_headers`/
/// `set_query` value and `body_expr` is expression source evaluated against
/// `binding`. `body_expr: None` leaves the body untouched. Returns the new
/// headers, query string, body, and whether the body changed (which forces
/// `Content-Type: application/json` on the caller's behalf).
pub fn apply_transform(
    engine: &ExpressionEngine,
    transform: &Transform,
    mut headers: HashMap<String, String>,
    query: &str,
    mut body: serde_json::Value,
    binding: &Binding,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(HashMap<String, String>, String, serde_json::Value, bool), TransformError> {
    for name in &transform.delete_headers {
        headers.remove(name);
    }
    for (name, expr_src) in &transform.set_headers {
        headers.insert(name.clone(), engine.eval_string(expr_src, binding, now)?);
    }

    let new_query = if transform.delete_query.is_empty() && transform.set_query.is_empty() {
        query.to_string()
    } else {
        let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .filter(|(k, _)| !transform.delete_query.contains(k))
            .collect();
        for (name, expr_src) in &transform.set_query {
            let value = engine.eval_string(expr_src, binding, now)?;
            pairs.retain(|(k, _)| k != name);
            pairs.push((name.clone(), value));
        }
        url::form_urlencoded::Serializer::new(String::new()).extend_pairs(&pairs).finish()
    };

    let mut body_changed = false;
    if let Some(expr_src) = &transform.body_expr {
        body = engine.eval(expr_src, binding, now)?.to_json();
        body_changed = true;
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }

    Ok((headers, new_query, body, body_changed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> chrono::DateTime<chrono::Utc> {
        use chrono::TimeZone;
        chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn nil_transform_leaves_headers_query_and_body_untouched() {
        let engine = ExpressionEngine::new();
        let transform = Transform::default();
        let headers = HashMap::from([("X-Existing".to_string(), "1".to_string())]);
        let body = serde_json::json!({"a": 1});
        let binding = Binding::new();
        let (out_headers, out_query, out_body, changed) =
            apply_transform(&engine, &transform, headers.clone(), "a=1", body.clone(), &binding, now()).unwrap();
        assert_eq!(out_headers, headers);
        assert_eq!(out_query, "a=1");
        assert_eq!(out_body, body);
        assert!(!changed);
    }

    #[test]
    fn delete_runs_before_set_on_same_header() {
        let engine = ExpressionEngine::new();
        let mut transform = Transform::default();
        transform.delete_headers.push("X-Trace".to_string());
        transform.set_headers.push(("X-Trace".to_string(), "'new'".to_string()));
        let headers = HashMap::from([("X-Trace".to_string(), "old".to_string())]);
        let binding = Binding::new();
        let (out_headers, _, _, _) =
            apply_transform(&engine, &transform, headers, "", serde_json::json!({}), &binding, now()).unwrap();
        assert_eq!(out_headers.get("X-Trace"), Some(&"new".to_string()));
    }

    #[test]
    fn body_expr_field_access_produces_expected_json() {
        let engine = ExpressionEngine::new();
        let mut transform = Transform::default();
        transform.body_expr = Some("model".to_string());
        let mut binding = Binding::new();
        binding.set("model", Value::String("gpt-4".into()));
        let (headers, _, body, changed) =
            apply_transform(&engine, &transform, HashMap::new(), "", serde_json::Value::Null, &binding, now()).unwrap();
        assert!(changed);
        assert_eq!(headers.get("Content-Type"), Some(&"application/json".to_string()));
        assert_eq!(body, serde_json::json!("gpt-4"));
    }

    #[test]
    fn delete_query_param_removes_it() {
        let engine = ExpressionEngine::new();
        let mut transform = Transform::default();
        transform.delete_query.push("secret".to_string());
        let binding = Binding::new();
        let (_, query, _, _) = apply_transform(
            &engine,
            &transform,
            HashMap::new(),
            "secret=x&keep=1",
            serde_json::Value::Null,
            &binding,
            now(),
        )
        .unwrap();
        assert_eq!(query, "keep=1");
    }
}
