//! Query criteria for `filter` and `summary`.
//!
//! Criteria arrive as loose string parameters (query strings from the
//! reporting API) or are built directly. They resolve into [`Predicates`],
//! which render as a MongoDB filter document and can also be evaluated
//! in-process by the memory backend.

use std::collections::HashMap;

use mongodb::bson::{self, doc, Bson, Document};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::measurement::Measurement;

// ─── Defaults ────────────────────────────────────────────────────

/// Result cap applied when the caller gives no `limit`.
pub const DEFAULT_LIMIT: u64 = 100_000;

/// Width of the default `startedAt` window.
pub const DEFAULT_WINDOW_SECS: f64 = 7.0 * 24.0 * 3600.0;

// ─── Sorting ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Id,
    Name,
    Method,
    StartedAt,
    EndedAt,
    Elapsed,
}

impl SortKey {
    /// Field name in the stored document.
    pub fn field(self) -> &'static str {
        match self {
            Self::Id => "_id",
            Self::Name => "name",
            Self::Method => "method",
            Self::StartedAt => "startedAt",
            Self::EndedAt => "endedAt",
            Self::Elapsed => "elapsed",
        }
    }

    pub fn parse(raw: &str) -> StoreResult<Self> {
        match raw {
            "id" | "_id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            "method" => Ok(Self::Method),
            "startedAt" => Ok(Self::StartedAt),
            "endedAt" => Ok(Self::EndedAt),
            "elapsed" => Ok(Self::Elapsed),
            other => Err(StoreError::malformed(
                "sort_by",
                format!("unknown sort key \"{other}\""),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Anything other than "desc" sorts ascending.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    /// MongoDB sort direction.
    pub fn direction(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

// ─── Criteria ────────────────────────────────────────────────────

/// Optional filters, paging and ordering for a measurement query.
///
/// Zero or empty values add no predicate, so `elapsed = 0` and `name = ""`
/// behave as if they were not given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    /// `None` caps at [`DEFAULT_LIMIT`]; `Some(0)` means unlimited.
    pub limit: Option<u64>,
    pub skip: u64,
    pub sort_by: SortKey,
    pub sort: SortOrder,
    /// Lower bound (exclusive) on `startedAt`
    pub started_at: Option<f64>,
    /// Upper bound (inclusive) on `endedAt`
    pub ended_at: Option<f64>,
    /// Lower bound (inclusive) on `elapsed`
    pub elapsed: Option<f64>,
    pub name: Option<String>,
    pub method: Option<String>,
    pub args: Option<Value>,
    pub kwargs: Option<Value>,
}

impl Criteria {
    /// Parse criteria from string parameters. Unknown keys are ignored.
    ///
    /// `args` and `kwargs` are JSON text. Numbers must be finite.
    pub fn from_params(params: &HashMap<String, String>) -> StoreResult<Self> {
        let mut criteria = Self::default();

        if let Some(raw) = params.get("limit") {
            criteria.limit = Some(parse_count("limit", raw)?);
        }
        if let Some(raw) = params.get("skip") {
            criteria.skip = parse_count("skip", raw)?;
        }
        if let Some(raw) = params.get("sort_by") {
            criteria.sort_by = SortKey::parse(raw)?;
        }
        if let Some(raw) = params.get("sort") {
            criteria.sort = SortOrder::parse(raw);
        }
        if let Some(raw) = params.get("startedAt") {
            criteria.started_at = Some(parse_seconds("startedAt", raw)?);
        }
        if let Some(raw) = params.get("endedAt") {
            criteria.ended_at = Some(parse_seconds("endedAt", raw)?);
        }
        if let Some(raw) = params.get("elapsed") {
            criteria.elapsed = Some(parse_seconds("elapsed", raw)?);
        }
        criteria.name = params.get("name").cloned();
        criteria.method = params.get("method").cloned();
        if let Some(raw) = params.get("args") {
            criteria.args = Some(parse_json("args", raw)?);
        }
        if let Some(raw) = params.get("kwargs") {
            criteria.kwargs = Some(parse_json("kwargs", raw)?);
        }

        Ok(criteria)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn sorted_by(mut self, key: SortKey, order: SortOrder) -> Self {
        self.sort_by = key;
        self.sort = order;
        self
    }

    pub fn started_after(mut self, secs: f64) -> Self {
        self.started_at = Some(secs);
        self
    }

    pub fn ended_before(mut self, secs: f64) -> Self {
        self.ended_at = Some(secs);
        self
    }

    pub fn min_elapsed(mut self, secs: f64) -> Self {
        self.elapsed = Some(secs);
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_kwargs(mut self, kwargs: Value) -> Self {
        self.kwargs = Some(kwargs);
        self
    }

    /// Maximum number of results, or `None` for unlimited.
    pub fn effective_limit(&self) -> Option<u64> {
        match self.limit {
            None => Some(DEFAULT_LIMIT),
            Some(0) => None,
            Some(n) => Some(n),
        }
    }

    /// Predicates for `filter`: missing time bounds fall back to the last
    /// seven days ending at `now`.
    pub fn window(&self, now: f64) -> Predicates {
        Predicates {
            started_after: truthy_number(self.started_at.unwrap_or(now - DEFAULT_WINDOW_SECS)),
            ended_before: truthy_number(self.ended_at.unwrap_or(now)),
            ..self.given()
        }
    }

    /// Predicates for `summary`: no default time window, no args/kwargs.
    pub fn summary_predicates(&self) -> Predicates {
        Predicates {
            args: None,
            kwargs: None,
            ..self.given()
        }
    }

    // Only the predicates the caller actually supplied.
    fn given(&self) -> Predicates {
        Predicates {
            name: self.name.clone().filter(|s| !s.is_empty()),
            method: self.method.clone().filter(|s| !s.is_empty()),
            started_after: self.started_at.and_then(truthy_number),
            ended_before: self.ended_at.and_then(truthy_number),
            min_elapsed: self.elapsed.and_then(truthy_number),
            args: self.args.clone().filter(is_truthy),
            kwargs: self.kwargs.clone().filter(is_truthy),
        }
    }
}

// ─── Predicates ──────────────────────────────────────────────────

/// Resolved match conditions shared by both backends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicates {
    pub name: Option<String>,
    pub method: Option<String>,
    pub started_after: Option<f64>,
    pub ended_before: Option<f64>,
    pub min_elapsed: Option<f64>,
    pub args: Option<Value>,
    pub kwargs: Option<Value>,
}

impl Predicates {
    /// Render as a MongoDB filter document.
    pub fn to_document(&self) -> StoreResult<Document> {
        let mut filter = Document::new();
        if let Some(name) = &self.name {
            filter.insert("name", name.as_str());
        }
        if let Some(method) = &self.method {
            filter.insert("method", method.as_str());
        }
        if let Some(v) = self.ended_before {
            filter.insert("endedAt", doc! { "$lte": v });
        }
        if let Some(v) = self.started_after {
            filter.insert("startedAt", doc! { "$gt": v });
        }
        if let Some(v) = self.min_elapsed {
            filter.insert("elapsed", doc! { "$gte": v });
        }
        if let Some(args) = &self.args {
            filter.insert("args", to_bson("args", args)?);
        }
        if let Some(kwargs) = &self.kwargs {
            filter.insert("kwargs", to_bson("kwargs", kwargs)?);
        }
        Ok(filter)
    }

    /// Evaluate against an already-decoded record.
    pub fn matches(&self, m: &Measurement) -> bool {
        self.name.as_ref().map_or(true, |n| &m.name == n)
            && self.method.as_ref().map_or(true, |v| &m.method == v)
            && self.ended_before.map_or(true, |v| m.ended_at <= v)
            && self.started_after.map_or(true, |v| m.started_at > v)
            && self.min_elapsed.map_or(true, |v| m.elapsed >= v)
            && self.args.as_ref().map_or(true, |v| &m.args == v)
            && self.kwargs.as_ref().map_or(true, |v| &m.kwargs == v)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

fn parse_count(field: &str, raw: &str) -> StoreResult<u64> {
    raw.trim().parse().map_err(|_| {
        StoreError::malformed(
            field,
            format!("expected a non-negative integer, got \"{raw}\""),
        )
    })
}

fn parse_seconds(field: &str, raw: &str) -> StoreResult<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(StoreError::malformed(
            field,
            format!("expected a finite number, got \"{raw}\""),
        )),
    }
}

fn parse_json(field: &str, raw: &str) -> StoreResult<Value> {
    serde_json::from_str(raw).map_err(|e| StoreError::malformed(field, e))
}

fn to_bson(field: &str, value: &Value) -> StoreResult<Bson> {
    bson::to_bson(value).map_err(|e| StoreError::malformed(field, e))
}

fn truthy_number(v: f64) -> Option<f64> {
    (v != 0.0).then_some(v)
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
