use super::trips::TripSummary;
use serde::Serialize;
use utoipa::ToSchema;

/// Short-term engagement signals derived from the last 30 days of trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct EngagementMetrics {
    pub active_users_7d: u64,
    pub active_users_30d: u64,
    /// Users active in the last 30 days but not the last 7, as a percentage of the former
    pub churn_risk_rate: f64,
    pub users_at_risk: u64,
    /// Change in trips this week against last week, as a percentage
    pub weekly_trip_trend: Option<f64>,
    /// Trips per active user times ten, capped at 100
    pub engagement_score: f64,
    pub predicted_active_next_week: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Alert {
    pub code: String,
    pub severity: AlertSeverity,
    pub message: String,
}

/// Headline numbers for the dashboard landing view.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct Overview {
    pub total_users: Option<u64>,
    pub window_days: u32,
    /// Distinct users with a trip in the window
    pub active_users: Option<u64>,
    pub active_today: Option<u64>,
    pub trips: Option<TripSummary>,
    pub engagement: Option<EngagementMetrics>,
    pub alerts: Vec<Alert>,
}
