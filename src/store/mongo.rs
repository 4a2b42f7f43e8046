use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{self, doc, oid::ObjectId, Document};
use mongodb::{Client, Collection, IndexModel};
use tokio_stream::StreamExt;

use super::{MeasurementStore, MeasurementStream};
use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::criteria::Criteria;
use crate::error::{StoreError, StoreResult};
use crate::measurement::Measurement;
use crate::normalize::{self, PUBLIC_ID, STORAGE_ID};
use crate::summary::{self, SummaryRow};

/// MongoDB-backed store. One client, opened at construction and shared by
/// every operation; pooling is left to the driver.
pub struct MongoStore {
    collection: Collection<Document>,
    clock: Arc<dyn Clock>,
}

impl MongoStore {
    /// Connect and make sure the query index exists.
    ///
    /// The driver connects lazily, so an unreachable server surfaces here as
    /// a `Connection` error from the index creation.
    pub async fn connect(config: &StoreConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        tracing::info!(
            url = %config.mongo_url,
            database = %config.database,
            collection = %config.collection,
            "Connecting to MongoDB"
        );
        let client = Client::with_uri_str(&config.mongo_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);

        let store = Self { collection, clock };
        store.ensure_index().await?;
        Ok(store)
    }

    async fn ensure_index(&self) -> StoreResult<()> {
        let model = IndexModel::builder()
            .keys(doc! {
                "startedAt": 1,
                "endedAt": 1,
                "elapsed": 1,
                "name": 1,
                "method": 1,
            })
            .build();
        self.collection
            .create_index(model)
            .await
            .map_err(|e| StoreError::from_driver("create_index", e))?;
        tracing::info!("Measurement index ensured");
        Ok(())
    }
}

#[async_trait]
impl MeasurementStore for MongoStore {
    async fn insert(&self, record: &Measurement) -> StoreResult<Option<String>> {
        record.check_finite()?;
        let mut document = bson::to_document(record).map_err(StoreError::serialization)?;
        document.remove(PUBLIC_ID);
        document.remove(STORAGE_ID);

        let result = self
            .collection
            .insert_one(document)
            .await
            .map_err(|e| StoreError::from_driver("insert", e))?;
        Ok(result.inserted_id.as_object_id().map(|oid| oid.to_hex()))
    }

    async fn filter(&self, criteria: &Criteria) -> StoreResult<MeasurementStream> {
        let filter = criteria.window(self.clock.now()).to_document()?;
        let mut sort = Document::new();
        sort.insert(criteria.sort_by.field(), criteria.sort.direction());

        let mut find = self
            .collection
            .find(filter)
            .sort(sort)
            .skip(criteria.skip);
        if let Some(limit) = criteria.effective_limit() {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let cursor = find
            .await
            .map_err(|e| StoreError::from_driver("filter", e))?;
        let stream = cursor.filter_map(|item| match item {
            Ok(document) => normalize::decode_listed(document).map(Ok),
            Err(e) => Some(Err(StoreError::from_driver("filter", e))),
        });
        Ok(Box::pin(stream))
    }

    async fn get(&self, id: &str) -> StoreResult<Measurement> {
        let oid = ObjectId::parse_str(id).map_err(|_| StoreError::not_found(id))?;
        let found = self
            .collection
            .find_one(doc! { "_id": oid })
            .await
            .map_err(|e| StoreError::from_driver("get", e))?;
        match found {
            Some(document) => normalize::decode(document),
            None => Err(StoreError::not_found(id)),
        }
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(false);
        };
        let result = self
            .collection
            .delete_one(doc! { "_id": oid })
            .await
            .map_err(|e| StoreError::from_driver("delete", e))?;
        Ok(result.deleted_count > 0)
    }

    async fn truncate(&self) -> StoreResult<()> {
        let result = self
            .collection
            .delete_many(doc! {})
            .await
            .map_err(|e| StoreError::from_driver("truncate", e))?;
        tracing::info!(removed = result.deleted_count, "Truncated measurements");
        Ok(())
    }

    async fn summary(&self, criteria: &Criteria) -> StoreResult<Vec<SummaryRow>> {
        let match_condition = criteria.summary_predicates().to_document()?;
        let mut cursor = self
            .collection
            .aggregate(summary::pipeline(match_condition))
            .await
            .map_err(|e| StoreError::from_driver("summary", e))?;

        let mut rows = Vec::new();
        while let Some(group) = cursor.next().await {
            let group = group.map_err(|e| StoreError::from_driver("summary", e))?;
            rows.push(SummaryRow::from_group(&group)?);
        }
        Ok(rows)
    }
}
