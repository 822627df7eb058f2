use super::{limit, window_days};
use crate::AppState;
use crate::api::models::Panel;
use crate::api::models::trips::{ActivityEntry, ActivityQuery, TripSummary, UsagePatterns};
use crate::api::models::users::WindowQuery;
use crate::errors::Result;
use axum::{
    Json,
    extract::{Query, State},
};

const DEFAULT_PATTERN_DAYS: u32 = 30;

#[utoipa::path(
    get,
    path = "/trips/summary",
    tag = "trips",
    summary = "Trip summary",
    description = "Totals and averages of distance, duration and speed, with trip counts for today and the last 7 and 30 days.",
    responses(
        (status = 200, description = "Trip summary panel", body = Panel<TripSummary>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_trip_summary(State(state): State<AppState>) -> Json<Panel<TripSummary>> {
    Json(state.analytics.trip_summary().await)
}

#[utoipa::path(
    get,
    path = "/trips/patterns",
    tag = "trips",
    summary = "Usage patterns",
    description = "Trips in the window by hour of day and day of week (UTC).",
    params(WindowQuery),
    responses(
        (status = 200, description = "Hourly, weekday and heatmap counts", body = Panel<UsagePatterns>),
        (status = 400, description = "Window out of range"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_usage_patterns(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Panel<UsagePatterns>>> {
    let days = window_days("days", query.days, DEFAULT_PATTERN_DAYS)?;
    Ok(Json(state.analytics.usage_patterns(days).await))
}

#[utoipa::path(
    get,
    path = "/activity",
    tag = "trips",
    summary = "Live activity",
    description = "The most recent trips with their owners. Cached for a shorter time than other panels.",
    params(ActivityQuery),
    responses(
        (status = 200, description = "Newest trips first", body = Panel<Vec<ActivityEntry>>),
        (status = 400, description = "Limit out of range"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_recent_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Panel<Vec<ActivityEntry>>>> {
    let limit = limit(query.limit, state.analytics.settings().recent_trips_limit)?;
    Ok(Json(state.analytics.recent_trips(limit).await))
}
