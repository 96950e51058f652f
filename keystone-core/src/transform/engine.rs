use std::sync::Arc;

use dashmap::DashMap;

use super::binding::Binding;
use super::builtins::{self, EvalError};
use super::expr::{BinaryOp, Expr, UnaryOp};
use super::parser::{self, ParseError};
use super::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum TransformError {
    Parse(String),
    Eval(String),
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformError::Parse(s) => write!(f, "parse error: {s}"),
            TransformError::Eval(s) => write!(f, "eval error: {s}"),
        }
    }
}

impl From<ParseError> for TransformError {
    fn from(e: ParseError) -> Self {
        TransformError::Parse(e.0)
    }
}

impl From<EvalError> for TransformError {
    fn from(e: EvalError) -> Self {
        TransformError::Eval(e.0)
    }
}

/// Compiles and caches expressions so repeated evaluation of the same
/// route-configured source text (the common case — one expression, many
/// requests) skips re-parsing (`spec.md` §4.5). Keyed on the raw source
/// string, mirroring the route snapshot's "compile once, reuse" discipline
/// in `router.rs`.
#[derive(Default)]
pub struct ExpressionEngine {
    cache: DashMap<String, Arc<Expr>>,
}

impl ExpressionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&self, src: &str) -> Result<Arc<Expr>, TransformError> {
        if let Some(cached) = self.cache.get(src) {
            return Ok(cached.clone());
        }
        let expr = Arc::new(parser::parse(src)?);
        self.cache.insert(src.to_string(), expr.clone());
        Ok(expr)
    }

    /// `ValidateExpr(src)`: syntax-only check used when a route is saved.
    pub fn validate(&self, src: &str) -> Result<(), TransformError> {
        self.compile(src).map(|_| ())
    }

    pub fn eval(&self, src: &str, binding: &Binding, now: chrono::DateTime<chrono::Utc>) -> Result<Value, TransformError> {
        let expr = self.compile(src)?;
        Ok(eval_expr(&expr, binding, now)?)
    }

    pub fn eval_string(&self, src: &str, binding: &Binding, now: chrono::DateTime<chrono::Utc>) -> Result<String, TransformError> {
        Ok(self.eval(src, binding, now)?.display_string())
    }

    pub fn eval_float(&self, src: &str, binding: &Binding, now: chrono::DateTime<chrono::Utc>) -> Result<f64, TransformError> {
        let v = self.eval(src, binding, now)?;
        v.as_f64().ok_or_else(|| TransformError::Eval(format!("expression did not produce a number: {}", v.type_name())))
    }
}

fn eval_expr(expr: &Expr, binding: &Binding, now: chrono::DateTime<chrono::Utc>) -> Result<Value, EvalError> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(i) => Ok(Value::Int(*i)),
        Expr::Float(f) => Ok(Value::Float(*f)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Ident(name) => Ok(binding.get(name)),
        Expr::Field(base, name) => Ok(eval_expr(base, binding, now)?.field(name)),
        Expr::Index(base, idx_expr) => {
            let base_v = eval_expr(base, binding, now)?;
            let idx_v = eval_expr(idx_expr, binding, now)?;
            match idx_v {
                Value::Int(i) => Ok(base_v.index(i)),
                Value::String(s) => Ok(base_v.field(&s)),
                other => Err(EvalError(format!("index: unsupported key type {}", other.type_name()))),
            }
        }
        Expr::Call(name, arg_exprs) => {
            let mut args = Vec::with_capacity(arg_exprs.len());
            for a in arg_exprs {
                args.push(eval_expr(a, binding, now)?);
            }
            builtins::call(name, &args, now)
        }
        Expr::Unary(op, inner) => {
            let v = eval_expr(inner, binding, now)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Neg => v
                    .as_f64()
                    .map(|n| if matches!(v, Value::Int(_)) { Value::Int(-(n as i64)) } else { Value::Float(-n) })
                    .ok_or_else(|| EvalError(format!("cannot negate {}", v.type_name()))),
            }
        }
        Expr::Coalesce(lhs, rhs) => {
            match eval_expr(lhs, binding, now) {
                Ok(v) if !v.is_null_or_empty() => Ok(v),
                _ => eval_expr(rhs, binding, now),
            }
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, binding, now),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, binding: &Binding, now: chrono::DateTime<chrono::Utc>) -> Result<Value, EvalError> {
    match op {
        BinaryOp::And => {
            let l = eval_expr(lhs, binding, now)?;
            if !l.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_expr(rhs, binding, now)?.is_truthy()))
        }
        BinaryOp::Or => {
            let l = eval_expr(lhs, binding, now)?;
            if l.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_expr(rhs, binding, now)?.is_truthy()))
        }
        _ => {
            let l = eval_expr(lhs, binding, now)?;
            let r = eval_expr(rhs, binding, now)?;
            match op {
                BinaryOp::Add => {
                    if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                        Ok(Value::String(format!("{}{}", l.display_string(), r.display_string())))
                    } else {
                        numeric_binop(&l, &r, |a, b| a + b)
                    }
                }
                BinaryOp::Sub => numeric_binop(&l, &r, |a, b| a - b),
                BinaryOp::Mul => numeric_binop(&l, &r, |a, b| a * b),
                BinaryOp::Div => numeric_binop(&l, &r, |a, b| a / b),
                BinaryOp::Eq => Ok(Value::Bool(l == r)),
                BinaryOp::NotEq => Ok(Value::Bool(l != r)),
                BinaryOp::Lt => numeric_cmp(&l, &r, |a, b| a < b),
                BinaryOp::Lte => numeric_cmp(&l, &r, |a, b| a <= b),
                BinaryOp::Gt => numeric_cmp(&l, &r, |a, b| a > b),
                BinaryOp::Gte => numeric_cmp(&l, &r, |a, b| a >= b),
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            }
        }
    }
}

fn numeric_binop(l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    let a = l.as_f64().ok_or_else(|| EvalError(format!("expected number, got {}", l.type_name())))?;
    let b = r.as_f64().ok_or_else(|| EvalError(format!("expected number, got {}", r.type_name())))?;
    let result = f(a, b);
    if matches!(l, Value::Int(_)) && matches!(r, Value::Int(_)) && result.fract() == 0.0 {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

fn numeric_cmp(l: &Value, r: &Value, f: impl Fn(f64, f64) -> bool) -> Result<Value, EvalError> {
    let a = l.as_f64().ok_or_else(|| EvalError(format!("expected number, got {}", l.type_name())))?;
    let b = r.as_f64().ok_or_else(|| EvalError(format!("expected number, got {}", r.type_name())))?;
    Ok(Value::Bool(f(a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn coalesce_falls_through_missing_field_to_default() {
        let engine = ExpressionEngine::new();
        let mut binding = Binding::new();
        binding.set("allData", Value::String("data: {\"usage\":{}}\n\n".into()));
        let result = engine.eval("json(sseLastData(allData)).usage.tokens ?? 1", &binding, t()).unwrap();
        assert_eq!(result, Value::Int(1));
    }

    #[test]
    fn coalesce_prefers_present_value() {
        let engine = ExpressionEngine::new();
        let mut binding = Binding::new();
        binding.set("allData", Value::String("data: {\"usage\":{\"tokens\":42}}\n\n".into()));
        let result = engine.eval("json(sseLastData(allData)).usage.tokens ?? 1", &binding, t()).unwrap();
        assert_eq!(result, Value::Int(42));
    }

    #[test]
    fn compiled_expressions_are_cached() {
        let engine = ExpressionEngine::new();
        let binding = Binding::new();
        engine.eval("1 + 1", &binding, t()).unwrap();
        assert_eq!(engine.cache.len(), 1);
        engine.eval("1 + 1", &binding, t()).unwrap();
        assert_eq!(engine.cache.len(), 1);
    }

    #[test]
    fn string_concatenation_with_plus() {
        let engine = ExpressionEngine::new();
        let mut binding = Binding::new();
        binding.set("name", Value::String("world".into()));
        let result = engine.eval_string("'hello ' + name", &binding, t()).unwrap();
        assert_eq!(result, "hello world");
    }

    #[test]
    fn validate_rejects_malformed_syntax() {
        let engine = ExpressionEngine::new();
        assert!(engine.validate("1 +").is_err());
        assert!(engine.validate("1 + 1").is_ok());
    }

    #[test]
    fn field_access_on_missing_key_is_null_not_error() {
        let engine = ExpressionEngine::new();
        let binding = Binding::new();
        let result = engine.eval("body.missing", &binding, t()).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn eval_float_coerces_numeric_result() {
        let engine = ExpressionEngine::new();
        let binding = Binding::new();
        assert_eq!(engine.eval_float("2 * 3", &binding, t()).unwrap(), 6.0);
    }
}
