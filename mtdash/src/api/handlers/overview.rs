use super::window_days;
use crate::AppState;
use crate::api::models::Panel;
use crate::api::models::overview::Overview;
use crate::api::models::users::WindowQuery;
use crate::errors::Result;
use axum::{
    Json,
    extract::{Query, State},
};

#[utoipa::path(
    get,
    path = "/overview",
    tag = "overview",
    summary = "Dashboard overview",
    description = "Total and active users, trip totals, engagement signals and alerts. \
        Sections whose source could not be read are omitted and the panel is flagged partial.",
    params(WindowQuery),
    responses(
        (status = 200, description = "Overview panel", body = Panel<Overview>),
        (status = 400, description = "Window out of range"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_overview(State(state): State<AppState>, Query(query): Query<WindowQuery>) -> Result<Json<Panel<Overview>>> {
    let days = window_days("days", query.days, state.analytics.settings().active_window_days)?;
    Ok(Json(state.analytics.overview(days).await))
}
