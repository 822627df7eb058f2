use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Registered profiles, with or without trips.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct TotalUsers {
    pub total_users: u64,
}

/// Distinct users with at least one trip in a trailing window.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ActiveUsers {
    pub window_days: u32,
    pub active_users: u64,
}

/// Per-user trip aggregates. Users without trips keep zero totals and empty averages.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UserTripStats {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub subscription_tier: String,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub registered_at: Option<DateTime<Utc>>,
    pub trip_count: u64,
    /// Sum of effective distance, in miles
    pub total_distance: f64,
    pub average_distance: Option<f64>,
    pub total_fuel_used: f64,
    pub total_reimbursement: f64,
    /// Sum over trips with both start and end time
    pub total_duration_minutes: f64,
    pub average_duration_minutes: Option<f64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub first_trip_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_trip_at: Option<DateTime<Utc>>,
    pub days_since_last_trip: Option<i64>,
    /// Trips divided by whole weeks since the first trip (at least one)
    pub trips_per_week: f64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct AtRiskReport {
    pub inactivity_days: u32,
    /// Users whose last trip is older than the inactivity window, longest inactive first
    pub users: Vec<UserTripStats>,
    /// Registered users that never recorded a trip
    pub never_used_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    PowerUser,
    Regular,
    Casual,
    New,
    AtRisk,
    Churned,
}

impl Segment {
    pub const ALL: [Segment; 6] = [
        Segment::PowerUser,
        Segment::Regular,
        Segment::Casual,
        Segment::New,
        Segment::AtRisk,
        Segment::Churned,
    ];
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserSegment {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub segment: Segment,
    pub trip_count: u64,
    pub days_inactive: i64,
    /// Weighted blend of trip count, relative distance and recency
    pub activity_score: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SegmentCount {
    pub segment: Segment,
    pub users: u64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SegmentReport {
    pub counts: Vec<SegmentCount>,
    pub users: Vec<UserSegment>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WindowQuery {
    /// Trailing window in days (1-365)
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TopUsersQuery {
    /// Number of users to return (1-500)
    pub limit: Option<usize>,
    /// Include users without any trip
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AtRiskQuery {
    /// Days without a trip before a user counts as at risk (1-365)
    pub inactivity_days: Option<u32>,
}
