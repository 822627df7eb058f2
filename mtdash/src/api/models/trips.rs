use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Totals and averages across all trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct TripSummary {
    pub total_trips: u64,
    pub total_distance: f64,
    pub average_distance: Option<f64>,
    /// Average over trips with both start and end time
    pub average_duration_minutes: Option<f64>,
    /// Average over trips with a positive duration and a distance
    pub average_speed_mph: Option<f64>,
    pub total_fuel_used: f64,
    pub total_reimbursement: f64,
    pub trips_today: u64,
    pub trips_last_7_days: u64,
    pub trips_last_30_days: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HourCount {
    pub hour: u32,
    pub trips: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WeekdayCount {
    /// Monday, Tuesday, ...
    pub weekday: String,
    pub trips: u64,
}

/// When trips happen, by hour of day and day of week (UTC).
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct UsagePatterns {
    pub window_days: u32,
    pub by_hour: Vec<HourCount>,
    pub by_weekday: Vec<WeekdayCount>,
    /// Seven rows (Monday first) of 24 hourly counts
    pub heatmap: Vec<Vec<u64>>,
    pub busiest_hour: Option<u32>,
    pub busiest_weekday: Option<String>,
    /// Every month with trips, not limited to the window
    pub monthly_trend: Vec<MonthlyTrend>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MonthlyTrend {
    /// `YYYY-MM`
    pub month: String,
    pub trips: u64,
    pub total_distance: f64,
    pub unique_users: u64,
}

/// One trip in the live activity feed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActivityEntry {
    #[schema(value_type = String, format = "uuid")]
    pub trip_id: Uuid,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time: Option<DateTime<Utc>>,
    pub user: String,
    pub subscription_tier: String,
    pub distance: Option<f64>,
    pub duration_minutes: Option<f64>,
    pub purpose: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ActivityQuery {
    /// Number of trips to return (1-500)
    pub limit: Option<usize>,
}
