//! HTTP handlers for the business reports: revenue, growth and retention.

use crate::AppState;
use crate::api::models::Panel;
use crate::api::models::growth::GrowthReport;
use crate::api::models::retention::RetentionReport;
use crate::api::models::revenue::RevenueReport;
use axum::{Json, extract::State};

#[utoipa::path(
    get,
    path = "/revenue",
    tag = "reports",
    summary = "Subscription revenue",
    description = "Monthly and annual recurring revenue from each user's subscription tier, with a per-tier breakdown.",
    responses(
        (status = 200, description = "Revenue panel", body = Panel<RevenueReport>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_revenue(State(state): State<AppState>) -> Json<Panel<RevenueReport>> {
    Json(state.analytics.revenue().await)
}

#[utoipa::path(
    get,
    path = "/growth",
    tag = "reports",
    summary = "Growth",
    description = "Week over week, month over month and quarter over quarter growth of registrations and trips. \
        A delta is null when the previous period had nothing to compare against.",
    responses(
        (status = 200, description = "Growth panel", body = Panel<GrowthReport>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_growth(State(state): State<AppState>) -> Json<Panel<GrowthReport>> {
    Json(state.analytics.growth().await)
}

#[utoipa::path(
    get,
    path = "/retention",
    tag = "reports",
    summary = "Retention",
    description = "Day 1, 7 and 30 retention counted from each user's first trip, activation rates and weekly registration cohorts \
        with the share of each cohort active in every week since registering.",
    responses(
        (status = 200, description = "Retention panel", body = Panel<RetentionReport>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_retention(State(state): State<AppState>) -> Json<Panel<RetentionReport>> {
    Json(state.analytics.retention().await)
}
