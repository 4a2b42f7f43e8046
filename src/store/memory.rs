use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{self, oid::ObjectId, Document};
use parking_lot::RwLock;

use super::{MeasurementStore, MeasurementStream};
use crate::clock::Clock;
use crate::criteria::{Criteria, Predicates, SortKey, SortOrder};
use crate::error::{StoreError, StoreResult};
use crate::measurement::Measurement;
use crate::normalize::{self, PUBLIC_ID, STORAGE_ID};
use crate::summary::{self, SummaryRow};

/// In-process store with the same query semantics as [`super::MongoStore`].
///
/// Records are kept as BSON documents so they go through the same
/// normalization on the way out. Predicates run against the decoded record,
/// which leaves two differences from MongoDB:
///
/// - `args`/`kwargs` equality ignores object key order, where MongoDB
///   compares embedded documents key by key in stored order.
/// - a missing `startedAt`/`endedAt`/`elapsed` reads as `0` and can satisfy
///   a range bound; MongoDB never matches a missing field against one.
pub struct MemoryStore {
    records: RwLock<BTreeMap<ObjectId, Document>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Decode every stored record that satisfies `predicates`, in id order.
    fn matching(&self, predicates: &Predicates) -> Vec<(ObjectId, Measurement)> {
        self.records
            .read()
            .iter()
            .filter_map(|(oid, document)| {
                normalize::decode_listed(document.clone()).map(|m| (*oid, m))
            })
            .filter(|(_, m)| predicates.matches(m))
            .collect()
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn insert(&self, record: &Measurement) -> StoreResult<Option<String>> {
        record.check_finite()?;
        let mut document = bson::to_document(record).map_err(StoreError::serialization)?;
        document.remove(PUBLIC_ID);

        let oid = ObjectId::new();
        document.insert(STORAGE_ID, oid);
        self.records.write().insert(oid, document);
        Ok(Some(oid.to_hex()))
    }

    async fn filter(&self, criteria: &Criteria) -> StoreResult<MeasurementStream> {
        // Payload criteria must convert to BSON here too.
        let predicates = criteria.window(self.clock.now());
        predicates.to_document()?;

        let mut rows = self.matching(&predicates);
        rows.sort_by(|a, b| {
            let ord = compare(criteria.sort_by, a, b);
            match criteria.sort {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let skip = usize::try_from(criteria.skip).unwrap_or(usize::MAX);
        let take = criteria
            .effective_limit()
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let page: Vec<StoreResult<Measurement>> = rows
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|(_, m)| Ok(m))
            .collect();

        Ok(Box::pin(tokio_stream::iter(page)))
    }

    async fn get(&self, id: &str) -> StoreResult<Measurement> {
        let oid = ObjectId::parse_str(id).map_err(|_| StoreError::not_found(id))?;
        let document = self
            .records
            .read()
            .get(&oid)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))?;
        normalize::decode(document)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(false);
        };
        Ok(self.records.write().remove(&oid).is_some())
    }

    async fn truncate(&self) -> StoreResult<()> {
        let mut records = self.records.write();
        let removed = records.len();
        records.clear();
        tracing::info!(removed, "Truncated measurements");
        Ok(())
    }

    async fn summary(&self, criteria: &Criteria) -> StoreResult<Vec<SummaryRow>> {
        let rows = self.matching(&criteria.summary_predicates());
        Ok(summary::summarize(rows.iter().map(|(_, m)| m)))
    }
}

fn compare(key: SortKey, a: &(ObjectId, Measurement), b: &(ObjectId, Measurement)) -> Ordering {
    let (a_id, a) = a;
    let (b_id, b) = b;
    match key {
        SortKey::Id => a_id.cmp(b_id),
        SortKey::Name => a.name.cmp(&b.name),
        SortKey::Method => a.method.cmp(&b.method),
        SortKey::StartedAt => a.started_at.total_cmp(&b.started_at),
        SortKey::EndedAt => a.ended_at.total_cmp(&b.ended_at),
        SortKey::Elapsed => a.elapsed.total_cmp(&b.elapsed),
    }
    .then_with(|| a_id.cmp(b_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::criteria::DEFAULT_WINDOW_SECS;
    use crate::store::collect;
    use mongodb::bson::doc;
    use serde_json::json;

    const NOW: f64 = 1_700_000_000.0;
    const HOUR: f64 = 3600.0;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(FixedClock(NOW)))
    }

    /// A call that started `ago` seconds before NOW and ran for `elapsed`.
    fn call(name: &str, method: &str, ago: f64, elapsed: f64) -> Measurement {
        let started = NOW - ago;
        Measurement::new(name, method, started, started + elapsed)
    }

    async fn names(store: &MemoryStore, criteria: &Criteria) -> Vec<String> {
        collect(store.filter(criteria).await.unwrap())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect()
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = store();
        let record = call("/api/users/:id", "GET", HOUR, 0.25)
            .with_args(json!(["x", 2]))
            .with_kwargs(json!({"id": "42", "nested": {"deep": [1, 2.5, null]}}))
            .with_context(json!({"url": "/api/users/42"}));

        let id = store.insert(&record).await.unwrap().expect("acknowledged");
        let fetched = store.get(&id).await.unwrap();

        assert_eq!(fetched.id.as_deref(), Some(id.as_str()));
        assert_eq!(Measurement { id: None, ..fetched }, record);
    }

    #[tokio::test]
    async fn supplied_id_is_ignored() {
        let store = store();
        let mut record = call("/a", "GET", HOUR, 1.0);
        record.id = Some("caller-chosen".into());

        let id = store.insert(&record).await.unwrap().unwrap();
        assert_ne!(id, "caller-chosen");
        assert!(store.get("caller-chosen").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn default_window_is_last_seven_days() {
        let store = store();
        store.insert(&call("recent", "GET", HOUR, 1.0)).await.unwrap();
        store
            .insert(&call("stale", "GET", DEFAULT_WINDOW_SECS + HOUR, 1.0))
            .await
            .unwrap();
        // Ends after NOW, so it is outside `endedAt <= now`.
        store.insert(&call("running", "GET", 1.0, 10.0)).await.unwrap();

        assert_eq!(names(&store, &Criteria::default()).await, vec!["recent"]);
    }

    #[tokio::test]
    async fn filters_by_name() {
        let store = store();
        store.insert(&call("X", "GET", HOUR, 1.0)).await.unwrap();
        store.insert(&call("Y", "GET", HOUR, 1.0)).await.unwrap();
        store.insert(&call("X", "POST", HOUR, 1.0)).await.unwrap();

        assert_eq!(
            names(&store, &Criteria::default().with_name("X")).await,
            vec!["X", "X"]
        );
        assert!(names(&store, &Criteria::default().with_name("nope"))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn filters_by_method_elapsed_and_kwargs() {
        let store = store();
        store
            .insert(&call("/a", "GET", HOUR, 0.1).with_kwargs(json!({"id": "1"})))
            .await
            .unwrap();
        store
            .insert(&call("/b", "GET", HOUR, 2.0).with_kwargs(json!({"id": "2"})))
            .await
            .unwrap();
        store.insert(&call("/c", "POST", HOUR, 3.0)).await.unwrap();

        assert_eq!(
            names(&store, &Criteria::default().with_method("GET").min_elapsed(1.0)).await,
            vec!["/b"]
        );
        assert_eq!(
            names(&store, &Criteria::default().with_kwargs(json!({"id": "1"}))).await,
            vec!["/a"]
        );
    }

    #[tokio::test]
    async fn sorts_and_skips() {
        let store = store();
        store.insert(&call("slow", "GET", HOUR, 3.0)).await.unwrap();
        store.insert(&call("fast", "GET", HOUR, 1.0)).await.unwrap();
        store.insert(&call("mid", "GET", HOUR, 2.0)).await.unwrap();

        assert_eq!(
            names(&store, &Criteria::default()).await,
            vec!["slow", "fast", "mid"]
        );
        assert_eq!(
            names(
                &store,
                &Criteria::default().sorted_by(SortKey::Elapsed, SortOrder::Desc)
            )
            .await,
            vec!["slow", "mid", "fast"]
        );
        assert_eq!(
            names(
                &store,
                &Criteria::default()
                    .sorted_by(SortKey::Elapsed, SortOrder::Asc)
                    .with_skip(1)
            )
            .await,
            vec!["mid", "slow"]
        );
    }

    #[tokio::test]
    async fn limit_always_caps_and_zero_means_unlimited() {
        let store = store();
        for i in 0..5 {
            store
                .insert(&call(&format!("/r{i}"), "GET", HOUR, 1.0))
                .await
                .unwrap();
        }

        assert_eq!(names(&store, &Criteria::default().with_limit(2)).await.len(), 2);
        assert_eq!(
            names(&store, &Criteria::default().with_limit(2).with_skip(4)).await,
            vec!["/r4"]
        );
        assert_eq!(names(&store, &Criteria::default().with_limit(0)).await.len(), 5);
        assert_eq!(names(&store, &Criteria::default()).await.len(), 5);
    }

    #[tokio::test]
    async fn summary_groups_by_method_and_name() {
        let store = store();
        for elapsed in [1.0, 5.0, 10.0] {
            store.insert(&call("/a", "GET", HOUR, elapsed)).await.unwrap();
        }
        store.insert(&call("/a", "POST", HOUR, 7.0)).await.unwrap();

        let rows = store
            .summary(&Criteria::default().with_method("GET"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!((row.method.as_str(), row.name.as_str()), ("GET", "/a"));
        assert_eq!(row.count, 3);
        assert_eq!(row.min_elapsed, 1.0);
        assert_eq!(row.max_elapsed, 10.0);
        assert!((row.avg_elapsed - 5.33).abs() < 0.01);

        assert_eq!(store.summary(&Criteria::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn summary_has_no_default_window() {
        let store = store();
        store
            .insert(&call("/old", "GET", DEFAULT_WINDOW_SECS * 4.0, 1.0))
            .await
            .unwrap();

        assert!(names(&store, &Criteria::default()).await.is_empty());
        assert_eq!(store.summary(&Criteria::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let store = store();
        let id = store
            .insert(&call("/a", "GET", HOUR, 1.0))
            .await
            .unwrap()
            .unwrap();

        assert!(store.delete(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap_err().is_not_found());
        assert!(!store.delete(&id).await.unwrap());
        assert!(!store.delete(&ObjectId::new().to_hex()).await.unwrap());
        assert!(!store.delete("not-an-object-id").await.unwrap());
    }

    #[tokio::test]
    async fn truncate_empties_the_store() {
        let store = store();
        store.insert(&call("/a", "GET", HOUR, 1.0)).await.unwrap();
        store.insert(&call("/b", "GET", HOUR, 1.0)).await.unwrap();

        store.truncate().await.unwrap();

        assert!(store.is_empty());
        assert!(names(&store, &Criteria::default().with_limit(0))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn partial_records_are_accepted() {
        let store = store();
        let mut record = Measurement::default();
        record.name = "/partial".into();
        let id = store.insert(&record).await.unwrap().unwrap();

        let fetched = store.get(&id).await.unwrap();
        assert_eq!(fetched.name, "/partial");
        assert_eq!(fetched.elapsed, 0.0);
    }

    #[tokio::test]
    async fn non_finite_records_are_refused() {
        let store = store();
        store.insert(&call("/ok", "GET", HOUR, 1.0)).await.unwrap();

        let err = store
            .insert(&call("/bad", "GET", HOUR, 1.0).with_elapsed(f64::INFINITY))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }), "got {err:?}");
        assert_eq!(store.len(), 1);

        assert_eq!(
            names(&store, &Criteria::default().with_name("/ok")).await,
            vec!["/ok"]
        );
        assert_eq!(store.summary(&Criteria::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn undecodable_records_are_skipped() {
        let store = store();
        store.insert(&call("/ok", "GET", HOUR, 1.0)).await.unwrap();
        let oid = ObjectId::new();
        store.records.write().insert(
            oid,
            doc! { "_id": oid, "name": "/bad", "method": "GET", "elapsed": "inf" },
        );

        assert_eq!(
            names(&store, &Criteria::default().with_name("/ok")).await,
            vec!["/ok"]
        );
        assert_eq!(names(&store, &Criteria::default()).await, vec!["/ok"]);
        let rows = store.summary(&Criteria::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "/ok");
    }

    #[tokio::test]
    async fn kwargs_match_ignores_key_order() {
        let store = store();
        store
            .insert(&call("/a", "GET", HOUR, 1.0).with_kwargs(json!({"a": 1, "b": 2})))
            .await
            .unwrap();

        assert_eq!(
            names(&store, &Criteria::default().with_kwargs(json!({"b": 2, "a": 1}))).await,
            vec!["/a"]
        );
    }
}
