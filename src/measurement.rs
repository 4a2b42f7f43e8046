use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

// ─── Domain type ─────────────────────────────────────────────────

/// One profiled call, as persisted and as handed back to callers.
///
/// Every field defaults when absent or `null` so partial records can be
/// stored and read back. Unknown fields are carried in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Measurement {
    /// Database-assigned identifier. `None` until the record is stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Endpoint / route, e.g. "/api/users/:id"
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// HTTP verb
    #[serde(deserialize_with = "null_as_default")]
    pub method: String,
    /// Seconds since epoch
    #[serde(deserialize_with = "null_as_default")]
    pub started_at: f64,
    /// Seconds since epoch
    #[serde(deserialize_with = "null_as_default")]
    pub ended_at: f64,
    /// `ended_at - started_at`, in seconds
    #[serde(deserialize_with = "null_as_default")]
    pub elapsed: f64,
    /// Positional call arguments
    pub args: Value,
    /// Keyword call arguments
    pub kwargs: Value,
    /// Request context captured by the profiling middleware
    #[serde(skip_serializing_if = "Value::is_null")]
    pub context: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Measurement {
    /// Build a record for `method name` that ran from `started_at` to
    /// `ended_at`. `elapsed` is derived and never negative.
    pub fn new(
        name: impl Into<String>,
        method: impl Into<String>,
        started_at: f64,
        ended_at: f64,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            method: method.into(),
            started_at,
            ended_at,
            elapsed: (ended_at - started_at).max(0.0),
            args: Value::Array(Vec::new()),
            kwargs: Value::Object(Map::new()),
            context: Value::Null,
            extra: Map::new(),
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Value) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Override the derived duration, for records whose timer is more
    /// precise than the wall-clock timestamps.
    pub fn with_elapsed(mut self, elapsed: f64) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Fails with `InvalidRecord` when a timestamp or the duration is NaN or
    /// infinite. Stores call this before writing.
    pub fn check_finite(&self) -> StoreResult<()> {
        let numbers = [
            ("startedAt", self.started_at),
            ("endedAt", self.ended_at),
            ("elapsed", self.elapsed),
        ];
        match numbers.into_iter().find(|(_, v)| !v.is_finite()) {
            Some((field, value)) => Err(StoreError::invalid_record(
                field,
                format!("expected a finite number, got {value}"),
            )),
            None => Ok(()),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
