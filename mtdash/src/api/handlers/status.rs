//! HTTP handlers for connection status and maintenance.

use crate::AppState;
use crate::api::models::status::StatusReport;
use axum::{Json, extract::State, http::StatusCode};

#[utoipa::path(
    get,
    path = "/status",
    tag = "status",
    summary = "Connection status",
    description = "Health of the data source connection, data client counters and result cache state. \
        The health probe result is reused for the configured check interval.",
    responses(
        (status = 200, description = "Status report", body = StatusReport),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusReport> {
    let health = state.client.connection_status().await;
    let client = state.client.metrics().await;
    let cache = state.analytics.cache_stats().await;

    Json(StatusReport { health, client, cache })
}

#[utoipa::path(
    post,
    path = "/status/metrics/reset",
    tag = "status",
    summary = "Reset client metrics",
    description = "Zero the data client counters and restart its uptime clock.",
    responses(
        (status = 204, description = "Metrics reset"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn reset_metrics(State(state): State<AppState>) -> StatusCode {
    state.client.reset_metrics();
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    post,
    path = "/cache/clear",
    tag = "status",
    summary = "Clear the result cache",
    description = "Drop every cached panel so the next request reads from the data source.",
    responses(
        (status = 204, description = "Cache cleared"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn clear_cache(State(state): State<AppState>) -> StatusCode {
    state.analytics.clear_cache();
    StatusCode::NO_CONTENT
}
