//! Flatten JSON option structs into query parameters.

use serde::Serialize;
use serde_json::Value;

use super::errors::ClientError;

/// Serialize `value` and flatten it into `key=value` query pairs.
///
/// Scalars become one pair, arrays repeat the key, nested objects use dotted
/// keys. Nulls and empty strings are skipped.
pub fn struct_to_params<T: Serialize + ?Sized>(value: &T) -> Result<Vec<(String, String)>, ClientError> {
    let json = serde_json::to_value(value)?;
    match json {
        Value::Object(_) | Value::Null => {
            let mut out = Vec::new();
            flatten("", &json, &mut out);
            Ok(out)
        }
        other => Err(ClientError::InvalidParameter(format!(
            "query params must be an object, got {other}"
        ))),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&key, child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                if let Some(v) = scalar(item) {
                    out.push((prefix.to_string(), v));
                }
            }
        }
        other => {
            if let Some(v) = scalar(other) {
                out.push((prefix.to_string(), v));
            }
        }
    }
}
