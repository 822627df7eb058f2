//! HTTP handlers for user analytics.

use super::{limit, window_days};
use crate::AppState;
use crate::api::models::Panel;
use crate::api::models::users::{
    ActiveUsers, AtRiskQuery, AtRiskReport, SegmentReport, TopUsersQuery, TotalUsers, UserTripStats, WindowQuery,
};
use crate::errors::Result;
use axum::{
    Json,
    extract::{Query, State},
};

#[utoipa::path(
    get,
    path = "/users/total",
    tag = "users",
    summary = "Total users",
    description = "Number of registered users, counted by the data source.",
    responses(
        (status = 200, description = "Registered user count", body = Panel<TotalUsers>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_total_users(State(state): State<AppState>) -> Json<Panel<TotalUsers>> {
    Json(state.analytics.total_users().await)
}

#[utoipa::path(
    get,
    path = "/users/active",
    tag = "users",
    summary = "Active users",
    description = "Distinct users with at least one trip in the trailing window.",
    params(WindowQuery),
    responses(
        (status = 200, description = "Active user count", body = Panel<ActiveUsers>),
        (status = 400, description = "Window out of range"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_active_users(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Panel<ActiveUsers>>> {
    let days = window_days("days", query.days, state.analytics.settings().active_window_days)?;
    Ok(Json(state.analytics.active_users(days).await))
}

#[utoipa::path(
    get,
    path = "/users/stats",
    tag = "users",
    summary = "Per-user statistics",
    description = "Trip aggregates for every registered user, including users without trips.",
    responses(
        (status = 200, description = "One entry per user", body = Panel<Vec<UserTripStats>>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user_stats(State(state): State<AppState>) -> Json<Panel<Vec<UserTripStats>>> {
    Json(state.analytics.user_stats().await)
}

#[utoipa::path(
    get,
    path = "/users/top",
    tag = "users",
    summary = "Top users",
    description = "Users ranked by trip count, ties broken by total distance.",
    params(TopUsersQuery),
    responses(
        (status = 200, description = "Ranked users", body = Panel<Vec<UserTripStats>>),
        (status = 400, description = "Limit out of range"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_top_users(
    State(state): State<AppState>,
    Query(query): Query<TopUsersQuery>,
) -> Result<Json<Panel<Vec<UserTripStats>>>> {
    let settings = state.analytics.settings();
    let limit = limit(query.limit, settings.top_users_limit)?;
    let include_inactive = query.include_inactive.unwrap_or(settings.include_inactive_in_top_users);
    Ok(Json(state.analytics.top_users(limit, include_inactive).await))
}

#[utoipa::path(
    get,
    path = "/users/at-risk",
    tag = "users",
    summary = "Users at risk",
    description = "Users whose last trip is older than the inactivity window, plus the number of users who never recorded one.",
    params(AtRiskQuery),
    responses(
        (status = 200, description = "Inactive users, longest inactive first", body = Panel<AtRiskReport>),
        (status = 400, description = "Inactivity window out of range"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_users_at_risk(
    State(state): State<AppState>,
    Query(query): Query<AtRiskQuery>,
) -> Result<Json<Panel<AtRiskReport>>> {
    let days = window_days(
        "inactivity_days",
        query.inactivity_days,
        state.analytics.settings().at_risk_inactivity_days,
    )?;
    Ok(Json(state.analytics.users_at_risk(days).await))
}

#[utoipa::path(
    get,
    path = "/users/segments",
    tag = "users",
    summary = "User segments",
    description = "Power, regular, casual, new, at-risk and churned users with an activity score each.",
    responses(
        (status = 200, description = "Segment counts and members", body = Panel<SegmentReport>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user_segments(State(state): State<AppState>) -> Json<Panel<SegmentReport>> {
    Json(state.analytics.user_segments().await)
}
