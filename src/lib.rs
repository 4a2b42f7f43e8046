//! Persistence and reporting for web-request profiling measurements.
//!
//! A [`store::MeasurementStore`] inserts, queries, deletes and summarizes
//! timing records. The [`middleware::profiling`] layer produces those records
//! from live requests and [`server::create_router`] exposes them over HTTP.

use std::sync::Arc;

pub mod clock;
pub mod config;
pub mod criteria;
pub mod error;
pub mod handlers;
pub mod measurement;
pub mod middleware;
pub mod normalize;
pub mod server;
pub mod store;
pub mod summary;

pub use criteria::{Criteria, SortKey, SortOrder};
pub use error::{StoreError, StoreResult};
pub use measurement::Measurement;
pub use store::MeasurementStore;
pub use summary::SummaryRow;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// The one store handle, opened at startup.
    pub store: Arc<dyn MeasurementStore>,

    /// Timestamp source for profiled requests.
    pub clock: Arc<dyn clock::Clock>,
}
