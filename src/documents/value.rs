//! Conversion between plain JSON and the document API's typed values

use serde_json::{json, Map, Value};

use crate::error::StoreError;

/// Encode a JSON value as a typed value
pub fn encode(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode the top-level fields of a document
pub fn encode_fields(map: &Map<String, Value>) -> Value {
    Value::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), encode(value)))
            .collect(),
    )
}

/// Decode a typed value back into plain JSON
pub fn decode(value: &Value) -> Result<Value, StoreError> {
    let (kind, inner) = value
        .as_object()
        .and_then(|map| map.iter().next())
        .ok_or_else(|| StoreError::UnexpectedResponse(format!("not a typed value: {}", value)))?;

    match (kind.as_str(), inner) {
        ("nullValue", _) => Ok(Value::Null),
        ("booleanValue", b) => Ok(b.clone()),
        ("integerValue", Value::String(s)) => s
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| StoreError::UnexpectedResponse(format!("bad integerValue {}: {}", s, e))),
        ("integerValue", n) => Ok(n.clone()),
        ("doubleValue", n) => Ok(n.clone()),
        ("stringValue", s) | ("timestampValue", s) | ("referenceValue", s) => Ok(s.clone()),
        ("arrayValue", inner) => {
            let values = match inner.get("values").and_then(Value::as_array) {
                Some(values) => values.iter().map(decode).collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        ("mapValue", inner) => decode_fields(inner.get("fields").unwrap_or(&Value::Null)),
        (other, _) => Err(StoreError::UnexpectedResponse(format!(
            "unsupported value type {}",
            other
        ))),
    }
}

/// Decode a `fields` object; a missing object decodes to `{}`
pub fn decode_fields(fields: &Value) -> Result<Value, StoreError> {
    let mut out = Map::new();
    if let Some(map) = fields.as_object() {
        for (key, value) in map {
            out.insert(key.clone(), decode(value)?);
        }
    }
    Ok(Value::Object(out))
}
