use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

use crate::core::error::AdminError;
use crate::core::state::AppState;
use crate::utils::auth::verify_api_key;

/// GET /metrics
///
/// Text exposition of the request-path counters plus live cache gauges.
/// Reading drains the per-window `ann_*` counters.
pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AdminError> {
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !verify_api_key(provided, &state.config.store.api_key) {
        warn!("Unauthorized metrics access");
        return Err(AdminError::Unauthorized);
    }

    let tracker = &state.tracker;
    let snapshot = tracker.metrics.snapshot(
        tracker.swarms.len(),
        tracker.swarms.peer_count(),
        tracker.users.len(),
    );

    Ok((
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        snapshot.render(),
    )
        .into_response())
}
