use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde_json::Value;

use crate::error::SchemaError;

/// string from non-string (object/array → JSON-stringify).
pub fn coerce_string(v: &Value, path: &str) -> Result<Value, SchemaError> {
    match v {
        Value::String(_) => Ok(v.clone()),
        Value::Object(_) | Value::Array(_) => Ok(Value::String(v.to_string())),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        Value::Null => Err(SchemaError::TypeMismatch {
            path: path.to_string(),
            expected: "string".into(),
            got: "null".into(),
        }),
    }
}

/// byte-string from a string with prefix `hex:`, `ascii:`, `utf8:`,
/// `base64:`, else default hex. Output is normalized to a JSON array of
/// octets so downstream code can build a `Vec<u8>` directly.
pub fn coerce_bytes(v: &Value, path: &str) -> Result<Value, SchemaError> {
    let bytes = match v {
        Value::Array(items) => items
            .iter()
            .map(|x| {
                x.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| SchemaError::TypeMismatch {
                        path: path.to_string(),
                        expected: "byte array".into(),
                        got: x.to_string(),
                    })
            })
            .collect::<Result<Vec<u8>, _>>()?,
        Value::String(s) => decode_prefixed_string(s, path)?,
        other => {
            return Err(SchemaError::TypeMismatch {
                path: path.to_string(),
                expected: "byte-string".into(),
                got: other.to_string(),
            })
        },
    };
    Ok(Value::Array(bytes.into_iter().map(|b| Value::from(b as u64)).collect()))
}

fn decode_prefixed_string(s: &str, path: &str) -> Result<Vec<u8>, SchemaError> {
    let bad = |reason: &str| SchemaError::Custom {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if let Some(rest) = s.strip_prefix("hex:") {
        hex::decode(rest).map_err(|e| bad(&e.to_string()))
    } else if let Some(rest) = s.strip_prefix("ascii:") {
        Ok(rest.as_bytes().to_vec())
    } else if let Some(rest) = s.strip_prefix("utf8:") {
        Ok(rest.as_bytes().to_vec())
    } else if let Some(rest) = s.strip_prefix("base64:") {
        B64.decode(rest).map_err(|e| bad(&e.to_string()))
    } else {
        hex::decode(s).map_err(|e| bad(&e.to_string()))
    }
}

/// numeric from string where lossless.
pub fn coerce_number(v: &Value, path: &str) -> Result<Value, SchemaError> {
    match v {
        Value::Number(_) => Ok(v.clone()),
        Value::String(s) => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| SchemaError::TypeMismatch {
                path: path.to_string(),
                expected: "number".into(),
                got: format!("\"{s}\""),
            }),
        other => Err(SchemaError::TypeMismatch {
            path: path.to_string(),
            expected: "number".into(),
            got: other.to_string(),
        }),
    }
}

/// boolean from truthy.
pub fn coerce_bool(v: &Value) -> Value {
    let truthy = match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0" && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    };
    Value::Bool(truthy)
}
