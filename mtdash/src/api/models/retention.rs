use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

/// Share of activated users still recording trips `day` days after their first one.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RetentionPoint {
    pub day: u32,
    /// Activated users whose day-N mark is not in the future
    pub eligible_users: u64,
    pub retained_users: u64,
    /// Percentage of eligible users, absent when none are eligible yet
    pub rate: Option<f64>,
}

/// How quickly new users record their first trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ActivationSummary {
    pub total_users: u64,
    pub activated_users: u64,
    /// Percentage of users with at least one trip
    pub activation_rate: f64,
    /// Percentage of activated users whose first trip came within 1, 7 and 30 days of registering
    pub within_1_day: f64,
    pub within_7_days: f64,
    pub within_30_days: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WeeklyCohort {
    /// Monday of the registration week
    #[schema(value_type = String, format = "date")]
    pub week_start: NaiveDate,
    pub registered: u64,
    pub activated: u64,
    pub activation_rate: f64,
    /// One entry per week since registration, up to the current week
    pub weekly_retention: Vec<CohortRetention>,
}

/// Cohort members with a trip in a given week after registering, as a share of the cohort's
/// members who ever recorded a trip.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CohortRetention {
    /// Weeks since the registration week (0 is the registration week itself)
    pub week: u32,
    pub active_users: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActivationBucket {
    /// Days from registration to first trip
    pub days: i64,
    pub users: u64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RetentionReport {
    pub retention: Vec<RetentionPoint>,
    pub activation: ActivationSummary,
    pub cohorts: Vec<WeeklyCohort>,
    /// Users by days to first trip, for the first 30 days
    pub time_to_first_trip: Vec<ActivationBucket>,
}
