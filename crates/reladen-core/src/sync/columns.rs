//! Translation between local documents and cloud rows.
//!
//! Locally every record is a camelCase JSON document with `updatedAt` in Unix
//! milliseconds. The cloud tables use snake_case columns and an RFC 3339
//! `updated_at`. Only top-level keys are renamed; nested JSON columns are
//! stored as they are.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::cloud::CloudError;

const LOCAL_UPDATED_AT: &str = "updatedAt";
const CLOUD_UPDATED_AT: &str = "updated_at";

pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.push(ch.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Unix milliseconds as an RFC 3339 UTC timestamp with millisecond precision.
pub fn millis_to_rfc3339(millis: i64) -> Result<String, CloudError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| CloudError::InvalidPayload(format!("timestamp out of range: {millis}")))
}

/// Accepts RFC 3339 strings and plain millisecond numbers.
pub fn timestamp_to_millis(value: &Value) -> Result<i64, CloudError> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| CloudError::InvalidPayload(format!("invalid timestamp: {number}"))),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|time| time.timestamp_millis())
            .map_err(|error| CloudError::InvalidPayload(format!("invalid timestamp {text}: {error}"))),
        other => Err(CloudError::InvalidPayload(format!(
            "invalid timestamp: {other}"
        ))),
    }
}

fn as_object(row: Value) -> Result<Map<String, Value>, CloudError> {
    match row {
        Value::Object(map) => Ok(map),
        other => Err(CloudError::InvalidPayload(format!(
            "row must be a JSON object, got {other}"
        ))),
    }
}

/// Local document to cloud row.
pub fn to_cloud_row(row: Value) -> Result<Value, CloudError> {
    let mut out = Map::new();
    for (key, value) in as_object(row)? {
        if key == LOCAL_UPDATED_AT {
            let millis = timestamp_to_millis(&value)?;
            out.insert(CLOUD_UPDATED_AT.to_string(), Value::String(millis_to_rfc3339(millis)?));
        } else {
            out.insert(to_snake_case(&key), value);
        }
    }
    Ok(Value::Object(out))
}

/// Cloud row to local document.
pub fn from_cloud_row(row: Value) -> Result<Value, CloudError> {
    let mut out = Map::new();
    for (key, value) in as_object(row)? {
        if key == CLOUD_UPDATED_AT {
            out.insert(
                LOCAL_UPDATED_AT.to_string(),
                Value::from(timestamp_to_millis(&value)?),
            );
        } else {
            out.insert(to_camel_case(&key), value);
        }
    }
    Ok(Value::Object(out))
}
