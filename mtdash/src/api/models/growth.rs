use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

/// Counts in the current and the preceding window of equal length.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PeriodGrowth {
    pub period_days: u32,
    pub current: u64,
    pub previous: u64,
    /// (current - previous) / previous, absent when there is nothing to compare against
    pub delta: Option<f64>,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Week over week, month over month and quarter over quarter.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GrowthSet {
    pub week_over_week: PeriodGrowth,
    pub month_over_month: PeriodGrowth,
    pub quarter_over_quarter: PeriodGrowth,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DailySignups {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub signups: u64,
    /// All profiles registered up to and including this day
    pub cumulative: u64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct GrowthReport {
    pub users: Option<GrowthSet>,
    pub trips: Option<GrowthSet>,
    pub daily_signups: Vec<DailySignups>,
}
