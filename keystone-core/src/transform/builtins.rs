use super::sse;
use super::value::Value;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq)]
pub struct EvalError(pub String);

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "eval error: {}", self.0)
    }
}

fn arg(args: &[Value], i: usize) -> Result<&Value, EvalError> {
    args.get(i).ok_or_else(|| EvalError(format!("missing argument {i}")))
}

fn arg_str(args: &[Value], i: usize) -> Result<String, EvalError> {
    Ok(arg(args, i)?.display_string())
}

/// Dispatch a call to one of the closed builtin functions (`spec.md` §4.5).
/// `now` supplies the current instant for `now`/`nowRFC3339` so the engine
/// stays deterministic under a `FixedClock` in tests.
pub fn call(name: &str, args: &[Value], now: chrono::DateTime<chrono::Utc>) -> Result<Value, EvalError> {
    match name {
        // strings
        "lower" => Ok(Value::String(arg_str(args, 0)?.to_lowercase())),
        "upper" => Ok(Value::String(arg_str(args, 0)?.to_uppercase())),
        "trim" => Ok(Value::String(arg_str(args, 0)?.trim().to_string())),
        "trimPrefix" => {
            let s = arg_str(args, 0)?;
            let prefix = arg_str(args, 1)?;
            Ok(Value::String(s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_string()))
        }
        "trimSuffix" => {
            let s = arg_str(args, 0)?;
            let suffix = arg_str(args, 1)?;
            Ok(Value::String(s.strip_suffix(suffix.as_str()).unwrap_or(&s).to_string()))
        }
        "replace" => {
            let s = arg_str(args, 0)?;
            let from = arg_str(args, 1)?;
            let to = arg_str(args, 2)?;
            Ok(Value::String(s.replace(&from, &to)))
        }
        "split" => {
            let s = arg_str(args, 0)?;
            let sep = arg_str(args, 1)?;
            Ok(Value::List(s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()))
        }
        "join" => {
            let list = arg(args, 0)?;
            let sep = arg_str(args, 1)?;
            match list {
                Value::List(items) => {
                    Ok(Value::String(items.iter().map(Value::display_string).collect::<Vec<_>>().join(&sep)))
                }
                other => Err(EvalError(format!("join: expected list, got {}", other.type_name()))),
            }
        }

        // encoding
        "base64Encode" => Ok(Value::String(base64::engine::general_purpose::STANDARD.encode(arg_str(args, 0)?))),
        "base64Decode" => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(arg_str(args, 0)?)
                .map_err(|e| EvalError(format!("base64Decode: {e}")))?;
            Ok(Value::String(String::from_utf8_lossy(&decoded).into_owned()))
        }
        "urlEncode" => Ok(Value::String(url::form_urlencoded::byte_serialize(arg_str(args, 0)?.as_bytes()).collect())),
        "urlDecode" => {
            let s = arg_str(args, 0)?;
            Ok(Value::String(url::form_urlencoded::parse(s.as_bytes()).map(|(k, _)| k.into_owned()).collect()))
        }
        "jsonEncode" => {
            let v = arg(args, 0)?;
            serde_json::to_string(&v.to_json()).map(Value::String).map_err(|e| EvalError(format!("jsonEncode: {e}")))
        }
        "jsonDecode" | "json" => {
            let s = arg_str(args, 0)?;
            let parsed: serde_json::Value = serde_json::from_str(&s).map_err(|e| EvalError(format!("json: {e}")))?;
            Ok(Value::from_json(parsed))
        }

        // crypto
        "sha256" => {
            let mut hasher = Sha256::new();
            hasher.update(arg_str(args, 0)?.as_bytes());
            Ok(Value::String(hex_encode(&hasher.finalize())))
        }
        "hmacSha256" => {
            // Signature is `hmacSha256(data, key)` (`spec.md` §4.5).
            let msg = arg_str(args, 0)?;
            let key = arg_str(args, 1)?;
            let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
                .map_err(|e| EvalError(format!("hmacSha256: {e}")))?;
            mac.update(msg.as_bytes());
            Ok(Value::String(hex_encode(&mac.finalize().into_bytes())))
        }

        // env / time
        "env" => Ok(Value::String(std::env::var(arg_str(args, 0)?).unwrap_or_default())),
        "now" => Ok(Value::Int(now.timestamp())),
        "nowRFC3339" => Ok(Value::String(now.to_rfc3339())),

        // null handling
        "coalesce" => Ok(args.iter().find(|v| !v.is_null_or_empty()).cloned().unwrap_or(Value::Null)),
        "default" => {
            let v = arg(args, 0)?;
            let fallback = arg(args, 1)?;
            if v.is_null_or_empty() { Ok(fallback.clone()) } else { Ok(v.clone()) }
        }

        // conversion
        "toString" => Ok(Value::String(arg(args, 0)?.display_string())),
        "toInt" => {
            let v = arg(args, 0)?;
            match v {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) => Ok(Value::Int(*f as i64)),
                Value::String(s) => {
                    s.trim().parse::<i64>().map(Value::Int).map_err(|_| EvalError(format!("toInt: cannot parse '{s}'")))
                }
                Value::Bool(b) => Ok(Value::Int(if *b { 1 } else { 0 })),
                other => Err(EvalError(format!("toInt: cannot convert {}", other.type_name()))),
            }
        }
        "toFloat" => {
            let v = arg(args, 0)?;
            v.as_f64().map(Value::Float).ok_or_else(|| EvalError(format!("toFloat: cannot convert {}", v.type_name())))
        }

        // collections
        "first" => match arg(args, 0)? {
            Value::List(items) => Ok(items.first().cloned().unwrap_or(Value::Null)),
            other => Err(EvalError(format!("first: expected list, got {}", other.type_name()))),
        },
        "last" => match arg(args, 0)? {
            Value::List(items) => Ok(items.last().cloned().unwrap_or(Value::Null)),
            other => Err(EvalError(format!("last: expected list, got {}", other.type_name()))),
        },
        "count" => match arg(args, 0)? {
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            Value::Map(map) => Ok(Value::Int(map.len() as i64)),
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            other => Err(EvalError(format!("count: unsupported type {}", other.type_name()))),
        },
        "sum" => {
            let items = numeric_items(args)?;
            Ok(Value::Float(items.into_iter().sum()))
        }
        "avg" => {
            let items = numeric_items(args)?;
            if items.is_empty() {
                Ok(Value::Float(0.0))
            } else {
                let len = items.len() as f64;
                Ok(Value::Float(items.into_iter().sum::<f64>() / len))
            }
        }
        "max" => numeric_reduce(args, f64::max).map(Value::Float),
        "min" => numeric_reduce(args, f64::min).map(Value::Float),
        "get" => {
            let base = arg(args, 0)?;
            let path = arg_str(args, 1)?;
            let mut result = base.clone();
            for segment in path.split('.') {
                result = match segment.parse::<i64>() {
                    Ok(i) => result.index(i),
                    Err(_) => result.field(segment),
                };
            }
            if result == Value::Null {
                if let Some(default) = args.get(2) {
                    return Ok(default.clone());
                }
            }
            Ok(result)
        }

        // text / SSE
        "lines" => Ok(Value::List(arg_str(args, 0)?.lines().map(|l| Value::String(l.to_string())).collect())),
        "linesNonEmpty" => Ok(Value::List(
            arg_str(args, 0)?.lines().filter(|l| !l.trim().is_empty()).map(|l| Value::String(l.to_string())).collect(),
        )),
        "sseEvents" => Ok(Value::List(
            sse::parse_events(&arg_str(args, 0)?)
                .into_iter()
                .map(|e| {
                    let mut map = std::collections::HashMap::new();
                    map.insert("event".to_string(), e.event.map(Value::String).unwrap_or(Value::Null));
                    map.insert("id".to_string(), e.id.map(Value::String).unwrap_or(Value::Null));
                    map.insert("data".to_string(), Value::String(e.data));
                    Value::Map(map)
                })
                .collect(),
        )),
        "sseLastData" => Ok(sse::last_data(&arg_str(args, 0)?).map(Value::String).unwrap_or(Value::Null)),
        "sseAllData" => Ok(Value::List(sse::all_data(&arg_str(args, 0)?).into_iter().map(Value::String).collect())),

        other => Err(EvalError(format!("unknown function '{other}'"))),
    }
}

/// Collect the numeric elements of `args[0]` (a list), optionally extracting
/// `args[1]` as a field name from each element first (`sum(arr[, field])`,
/// `spec.md` §4.5).
fn numeric_items(args: &[Value]) -> Result<Vec<f64>, EvalError> {
    let field = args.get(1).and_then(Value::as_str);
    match arg(args, 0)? {
        Value::List(items) => items
            .iter()
            .map(|item| {
                let v = match field {
                    Some(name) => item.field(name),
                    None => item.clone(),
                };
                v.as_f64().ok_or_else(|| EvalError(format!("expected numeric element, got {}", v.type_name())))
            })
            .collect(),
        other => Err(EvalError(format!("expected list, got {}", other.type_name()))),
    }
}

fn numeric_reduce(args: &[Value], f: impl Fn(f64, f64) -> f64) -> Result<f64, EvalError> {
    match arg(args, 0)? {
        Value::List(items) if items.is_empty() => Err(EvalError("cannot reduce an empty list".into())),
        Value::List(items) => {
            let mut nums = items.iter().map(|v| {
                v.as_f64().ok_or_else(|| EvalError(format!("expected numeric element, got {}", v.type_name())))
            });
            let first = nums.next().unwrap()?;
            nums.try_fold(first, |acc, n| n.map(|n| f(acc, n)))
        }
        other => Err(EvalError(format!("expected list, got {}", other.type_name()))),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn lower_upper_trim() {
        assert_eq!(call("lower", &[Value::String("ABC".into())], t()).unwrap(), Value::String("abc".into()));
        assert_eq!(call("upper", &[Value::String("abc".into())], t()).unwrap(), Value::String("ABC".into()));
        assert_eq!(call("trim", &[Value::String("  x  ".into())], t()).unwrap(), Value::String("x".into()));
    }

    #[test]
    fn base64_round_trip() {
        let encoded = call("base64Encode", &[Value::String("hi".into())], t()).unwrap();
        assert_eq!(encoded, Value::String("aGk=".into()));
        let decoded = call("base64Decode", &[encoded], t()).unwrap();
        assert_eq!(decoded, Value::String("hi".into()));
    }

    #[test]
    fn json_parses_into_map() {
        let v = call("json", &[Value::String(r#"{"usage":{"tokens":5}}"#.into())], t()).unwrap();
        assert_eq!(v.field("usage").field("tokens"), Value::Int(5));
    }

    #[test]
    fn coalesce_picks_first_non_empty() {
        let v = call("coalesce", &[Value::Null, Value::String(String::new()), Value::Int(7)], t()).unwrap();
        assert_eq!(v, Value::Int(7));
    }

    #[test]
    fn sum_avg_max_min() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(call("sum", &[list.clone()], t()).unwrap(), Value::Float(6.0));
        assert_eq!(call("avg", &[list.clone()], t()).unwrap(), Value::Float(2.0));
        assert_eq!(call("max", &[list.clone()], t()).unwrap(), Value::Float(3.0));
        assert_eq!(call("min", &[list], t()).unwrap(), Value::Float(1.0));
    }

    #[test]
    fn sha256_is_deterministic_and_hex() {
        let v = call("sha256", &[Value::String("abc".into())], t()).unwrap();
        assert_eq!(v, Value::String("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".into()));
    }

    #[test]
    fn get_returns_default_when_missing() {
        let base = Value::Map(std::collections::HashMap::new());
        let v = call("get", &[base, Value::String("missing".into()), Value::Int(42)], t()).unwrap();
        assert_eq!(v, Value::Int(42));
    }

    #[test]
    fn get_follows_dotted_path() {
        let json = call("json", &[Value::String(r#"{"a":{"b":{"c":9}}}"#.into())], t()).unwrap();
        let v = call("get", &[json, Value::String("a.b.c".into())], t()).unwrap();
        assert_eq!(v, Value::Int(9));
    }

    #[test]
    fn hmac_sha256_matches_known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let v = call(
            "hmacSha256",
            &[Value::String("The quick brown fox jumps over the lazy dog".into()), Value::String("key".into())],
            t(),
        )
        .unwrap();
        assert_eq!(v, Value::String("f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8".into()));
    }

    #[test]
    fn sum_extracts_named_field_from_object_list() {
        let list = Value::List(vec![
            call("json", &[Value::String(r#"{"tokens": 2}"#.into())], t()).unwrap(),
            call("json", &[Value::String(r#"{"tokens": 3}"#.into())], t()).unwrap(),
        ]);
        let v = call("sum", &[list, Value::String("tokens".into())], t()).unwrap();
        assert_eq!(v, Value::Float(5.0));
    }

    #[test]
    fn unknown_function_errors() {
        assert!(call("nope", &[], t()).is_err());
    }
}
