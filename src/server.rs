use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::measurements;
use crate::AppState;

/// Builds the reporting API `Router` over the shared store.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Measurement queries ─────────────────────────────────
        .route(
            "/api/measurements",
            get(measurements::list_measurements)
                .post(measurements::create_measurement)
                .delete(measurements::truncate_measurements),
        )
        .route(
            "/api/measurements/summary",
            get(measurements::measurement_summary),
        )
        .route(
            "/api/measurements/:id",
            get(measurements::get_measurement).delete(measurements::delete_measurement),
        )
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
