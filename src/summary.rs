use std::collections::BTreeMap;

use mongodb::bson::{doc, Bson, Document};
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::measurement::Measurement;

/// Elapsed-time aggregate for one (method, name) pair.
/// Serialized straight into the summary endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub method: String,
    pub name: String,
    pub count: u64,
    #[serde(rename = "min")]
    pub min_elapsed: f64,
    #[serde(rename = "max")]
    pub max_elapsed: f64,
    #[serde(rename = "avg")]
    pub avg_elapsed: f64,
}

impl SummaryRow {
    /// Parse one `$group` output document produced by [`pipeline`].
    pub fn from_group(group: &Document) -> StoreResult<Self> {
        let key = group
            .get_document("_id")
            .map_err(|e| StoreError::serialization(format!("summary group key: {e}")))?;

        Ok(Self {
            method: key_string(key, "method"),
            name: key_string(key, "name"),
            count: number(group, "count").map_or(0, |n| n as u64),
            min_elapsed: number(group, "min").unwrap_or(0.0),
            max_elapsed: number(group, "max").unwrap_or(0.0),
            avg_elapsed: number(group, "avg").unwrap_or(0.0),
        })
    }
}

/// Aggregation pipeline grouping matched records by (method, name).
pub fn pipeline(match_condition: Document) -> Vec<Document> {
    vec![
        doc! { "$match": match_condition },
        doc! {
            "$group": {
                "_id": { "method": "$method", "name": "$name" },
                "count": { "$sum": 1 },
                "min": { "$min": "$elapsed" },
                "max": { "$max": "$elapsed" },
                "avg": { "$avg": "$elapsed" },
            }
        },
    ]
}

// ─── In-process aggregation ──────────────────────────────────────

/// Running totals for one group.
struct SummaryAccumulator {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
}

impl SummaryAccumulator {
    fn new(elapsed: f64) -> Self {
        Self {
            count: 1,
            min: elapsed,
            max: elapsed,
            sum: elapsed,
        }
    }

    fn push(&mut self, elapsed: f64) {
        self.count += 1;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
        self.sum += elapsed;
    }
}

/// Group records by (method, name) the same way the `$group` stage does.
pub fn summarize<'a>(records: impl IntoIterator<Item = &'a Measurement>) -> Vec<SummaryRow> {
    let mut groups: BTreeMap<(String, String), SummaryAccumulator> = BTreeMap::new();

    for m in records {
        let key = (m.method.clone(), m.name.clone());
        match groups.get_mut(&key) {
            Some(acc) => acc.push(m.elapsed),
            None => {
                groups.insert(key, SummaryAccumulator::new(m.elapsed));
            }
        }
    }

    groups
        .into_iter()
        .map(|((method, name), acc)| SummaryRow {
            method,
            name,
            count: acc.count,
            min_elapsed: acc.min,
            max_elapsed: acc.max,
            avg_elapsed: acc.sum / acc.count as f64,
        })
        .collect()
}

// ─── Helpers ─────────────────────────────────────────────────────

fn key_string(key: &Document, field: &str) -> String {
    match key.get(field) {
        Some(Bson::String(s)) => s.clone(),
        Some(Bson::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn number(doc: &Document, field: &str) -> Option<f64> {
    match doc.get(field)? {
        Bson::Double(f) => Some(*f),
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}
