use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::criteria::Criteria;
use crate::measurement::Measurement;
use crate::store;
use crate::summary::SummaryRow;
use crate::AppState;

use super::AppError;

// ─── Response types ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct InsertStatus {
    pub inserted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteStatus {
    pub deleted: bool,
}

// ─── GET /api/measurements ───────────────────────────────────────

pub async fn list_measurements(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Measurement>>, AppError> {
    let criteria = Criteria::from_params(&params)?;
    let stream = state.store.filter(&criteria).await?;
    Ok(Json(store::collect(stream).await?))
}

// ─── POST /api/measurements ──────────────────────────────────────

pub async fn create_measurement(
    State(state): State<Arc<AppState>>,
    Json(record): Json<Measurement>,
) -> Result<(StatusCode, Json<InsertStatus>), AppError> {
    let id = state.store.insert(&record).await?;
    let status = if id.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };
    Ok((
        status,
        Json(InsertStatus {
            inserted: id.is_some(),
            id,
        }),
    ))
}

// ─── GET /api/measurements/summary ───────────────────────────────

pub async fn measurement_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<SummaryRow>>, AppError> {
    let criteria = Criteria::from_params(&params)?;
    Ok(Json(state.store.summary(&criteria).await?))
}

// ─── GET /api/measurements/:id ───────────────────────────────────

pub async fn get_measurement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Measurement>, AppError> {
    Ok(Json(state.store.get(&id).await?))
}

// ─── DELETE /api/measurements/:id ────────────────────────────────

pub async fn delete_measurement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteStatus>, AppError> {
    let deleted = state.store.delete(&id).await?;
    Ok(Json(DeleteStatus { deleted }))
}

// ─── DELETE /api/measurements ────────────────────────────────────

pub async fn truncate_measurements(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, AppError> {
    state.store.truncate().await?;
    Ok(StatusCode::NO_CONTENT)
}
