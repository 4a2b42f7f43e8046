use axum::{
    extract::{FromRequestParts, MatchedPath, Query, RawPathParams, Request, State},
    http::request::Parts,
    middleware::{self as axum_mw, Next},
    response::Response,
    Router,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::measurement::Measurement;
use crate::AppState;

/// Wrap every route of `router` with [`profile_request`].
pub fn instrument<S>(router: Router<S>, state: Arc<AppState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(axum_mw::from_fn_with_state(state, profile_request))
}

/// Middleware that records one [`Measurement`] per request:
///
///   name     — matched route template (raw path when unrouted)
///   kwargs   — path parameters
///   context  — url, response status and query parameters
///
/// Also sets a `Server-Timing` header. A failed write is logged and never
/// affects the response.
pub async fn profile_request(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();
    let method = parts.method.to_string();
    let name = parts
        .extensions
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| parts.uri.path().to_owned());
    let url = parts.uri.to_string();
    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or_default();
    let kwargs = path_params(&mut parts, &state).await;
    let req = Request::from_parts(parts, body);

    let started_at = state.clock.now();
    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let ended_at = state.clock.now();

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    let status = response.status().as_u16();
    let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    let record = Measurement::new(name, method, started_at, ended_at)
        .with_elapsed(elapsed.as_secs_f64())
        .with_kwargs(Value::Object(kwargs))
        .with_context(json!({
            "url":    url,
            "status": status,
            "query":  query,
        }));

    match state.store.insert(&record).await {
        Ok(Some(id)) => tracing::debug!(
            %id,
            method = %record.method,
            name = %record.name,
            status,
            elapsed_us,
            "profiled request"
        ),
        Ok(None) => tracing::warn!(
            method = %record.method,
            name = %record.name,
            "measurement write not acknowledged"
        ),
        Err(err) => tracing::warn!(
            error = %err,
            method = %record.method,
            name = %record.name,
            "failed to store measurement"
        ),
    }

    response
}

async fn path_params(parts: &mut Parts, state: &Arc<AppState>) -> Map<String, Value> {
    match RawPathParams::from_request_parts(parts, state).await {
        Ok(params) => params
            .iter()
            .map(|(k, v)| (k.to_owned(), Value::String(v.to_owned())))
            .collect(),
        Err(_) => Map::new(),
    }
}
