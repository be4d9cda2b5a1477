//! `Filter.value` is carried on both codecs as the stringified JSON of a
//! `{"value": T}` wrapper, where `T` is a scalar or an array of octets
//! (§6.1). This module is the single place that encodes/decodes it so the
//! binary and JSON codecs agree on the representation.

use mesh_types::FilterValue;
use serde_json::{json, Value};

pub fn to_wire_string(value: &FilterValue) -> String {
    let wrapped = match value {
        FilterValue::Absent => json!({}),
        FilterValue::String(s) => json!({ "value": s }),
        FilterValue::Number(n) => json!({ "value": n }),
        FilterValue::Bytes(b) => json!({ "value": b }),
    };
    wrapped.to_string()
}

pub fn from_wire_string(s: &str) -> Result<FilterValue, crate::error::WireError> {
    let parsed: Value = serde_json::from_str(s)?;
    let inner = match parsed {
        Value::Object(ref map) => map.get("value").cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    };
    Ok(from_json_value(inner))
}

fn from_json_value(v: Value) -> FilterValue {
    match v {
        Value::Null => FilterValue::Absent,
        Value::String(s) => FilterValue::String(s),
        Value::Number(n) => FilterValue::Number(n.as_f64().unwrap_or_default()),
        Value::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|x| x.as_u64().and_then(|v| u8::try_from(v).ok()))
                .collect();
            bytes.map(FilterValue::Bytes).unwrap_or(FilterValue::Absent)
        },
        _ => FilterValue::Absent,
    }
}
