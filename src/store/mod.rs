//! Persistence for measurements.
//!
//! [`MeasurementStore`] is the contract the profiling middleware and the
//! reporting API depend on. `MongoStore` is the production backend;
//! `MemoryStore` keeps everything in-process with the same query semantics.

pub mod memory;
pub mod mongo;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::clock::Clock;
use crate::config::{Backend, StoreConfig};
use crate::criteria::Criteria;
use crate::error::StoreResult;
use crate::measurement::Measurement;
use crate::summary::SummaryRow;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Lazily produced query results. Each `filter` call starts a fresh one.
pub type MeasurementStream = Pin<Box<dyn Stream<Item = StoreResult<Measurement>> + Send>>;

#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Persist a new record. Any `id` on the record is ignored.
    ///
    /// Returns the assigned id when the write is acknowledged, `None`
    /// otherwise.
    async fn insert(&self, record: &Measurement) -> StoreResult<Option<String>>;

    /// Records matching `criteria`, sorted, skipped and limited.
    async fn filter(&self, criteria: &Criteria) -> StoreResult<MeasurementStream>;

    /// Fails with `NotFound` when no record has this id.
    async fn get(&self, id: &str) -> StoreResult<Measurement>;

    /// `true` when a record was removed.
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Remove every record.
    async fn truncate(&self) -> StoreResult<()>;

    /// count/min/max/avg of `elapsed` per (method, name).
    async fn summary(&self, criteria: &Criteria) -> StoreResult<Vec<SummaryRow>>;
}

/// Open the backend selected by `config`.
pub async fn open(
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
) -> StoreResult<Arc<dyn MeasurementStore>> {
    match config.backend {
        Backend::Mongo => Ok(Arc::new(MongoStore::connect(config, clock).await?)),
        Backend::Memory => {
            tracing::info!("Using in-memory measurement store");
            Ok(Arc::new(MemoryStore::new(clock)))
        }
    }
}

/// Drain a result stream into a vector, stopping at the first error.
pub async fn collect(mut stream: MeasurementStream) -> StoreResult<Vec<Measurement>> {
    use tokio_stream::StreamExt;

    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        out.push(item?);
    }
    Ok(out)
}
