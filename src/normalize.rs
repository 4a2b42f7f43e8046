//! Turns stored documents into driver-agnostic records.
//!
//! The storage key `_id` becomes `id`, always as a string. Integers, floats, strings, mappings and
//! sequences pass through (as do booleans and nulls, which JSON carries
//! natively). Every other BSON value is replaced by its string form so no
//! driver type leaks into the reporting layer.

use mongodb::bson::{Bson, Document};
use serde_json::{Map, Number, Value};

use crate::error::{StoreError, StoreResult};
use crate::measurement::Measurement;

/// Storage-side identifier key.
pub const STORAGE_ID: &str = "_id";
/// Identifier key exposed to callers.
pub const PUBLIC_ID: &str = "id";

/// Normalize a stored document into a JSON object.
pub fn normalize_document(doc: Document) -> Map<String, Value> {
    doc.into_iter()
        .map(|(key, value)| {
            if key == STORAGE_ID {
                return (PUBLIC_ID.to_owned(), id_string(value));
            }
            let value = to_native(&key, value);
            (key, value)
        })
        .collect()
}

/// Normalize a stored document and decode it as a [`Measurement`].
pub fn decode(doc: Document) -> StoreResult<Measurement> {
    serde_json::from_value(Value::Object(normalize_document(doc)))
        .map_err(StoreError::serialization)
}

/// [`decode`] for listings: a record that does not decode is logged and
/// skipped instead of failing the whole result.
pub fn decode_listed(doc: Document) -> Option<Measurement> {
    let id = doc.get(STORAGE_ID).map(ToString::to_string);
    match decode(doc) {
        Ok(m) => Some(m),
        Err(err) => {
            tracing::warn!(id = ?id, error = %err, "Skipping undecodable measurement");
            None
        }
    }
}

// Ids written by other clients may be any scalar.
fn id_string(value: Bson) -> Value {
    match to_native(PUBLIC_ID, value) {
        v @ (Value::String(_) | Value::Null) => v,
        other => Value::String(other.to_string()),
    }
}

fn to_native(key: &str, value: Bson) -> Value {
    match value {
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => match Number::from_f64(f) {
            Some(n) => Value::Number(n),
            None => stringified(key, f.to_string()),
        },
        Bson::String(s) => Value::String(s),
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Null => Value::Null,
        Bson::Array(items) => Value::Array(items.into_iter().map(|v| to_native(key, v)).collect()),
        Bson::Document(doc) => Value::Object(normalize_nested(doc)),
        Bson::ObjectId(oid) => stringified(key, oid.to_hex()),
        Bson::DateTime(dt) => {
            let text = chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| dt.to_string());
            stringified(key, text)
        }
        other => stringified(key, other.to_string()),
    }
}

// Nested documents keep their own `_id` keys; only the top level is renamed.
fn normalize_nested(doc: Document) -> Map<String, Value> {
    doc.into_iter()
        .map(|(key, value)| {
            let value = to_native(&key, value);
            (key, value)
        })
        .collect()
}

fn stringified(key: &str, text: String) -> Value {
    tracing::trace!(field = key, value = %text, "stringified non-native value");
    Value::String(text)
}
