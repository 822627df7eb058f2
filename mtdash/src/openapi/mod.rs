//! OpenAPI documentation for the dashboard API at `/api/v1/*`, served as JSON at
//! `/api-docs/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::api;
use crate::api::models::{DataStatus, growth, overview, retention, revenue, status, trips, users};
use crate::client::{ClientMetricsReport, ConnectionStatus, HealthReport, MetricsSnapshot, RateLimitReport};
use crate::config::Environment;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mileage Tracker Dashboard API",
        description = "Read-only analytics over mileage tracker users and trips. \
            Every analytics endpoint returns a panel: the data, whether it is complete, \
            whether it came from the result cache and when it was computed."
    ),
    servers(
        (url = "/api/v1", description = "Dashboard API")
    ),
    paths(
        api::handlers::overview::get_overview,
        api::handlers::users::get_total_users,
        api::handlers::users::get_active_users,
        api::handlers::users::get_user_stats,
        api::handlers::users::get_top_users,
        api::handlers::users::get_users_at_risk,
        api::handlers::users::get_user_segments,
        api::handlers::trips::get_trip_summary,
        api::handlers::trips::get_usage_patterns,
        api::handlers::trips::get_recent_activity,
        api::handlers::reports::get_revenue,
        api::handlers::reports::get_growth,
        api::handlers::reports::get_retention,
        api::handlers::status::get_status,
        api::handlers::status::reset_metrics,
        api::handlers::status::clear_cache,
    ),
    components(
        schemas(
            DataStatus,
            overview::Overview,
            overview::EngagementMetrics,
            overview::Alert,
            overview::AlertSeverity,
            users::TotalUsers,
            users::ActiveUsers,
            users::UserTripStats,
            users::AtRiskReport,
            users::Segment,
            users::UserSegment,
            users::SegmentCount,
            users::SegmentReport,
            trips::TripSummary,
            trips::UsagePatterns,
            trips::HourCount,
            trips::WeekdayCount,
            trips::MonthlyTrend,
            trips::ActivityEntry,
            revenue::RevenueReport,
            revenue::TierBreakdown,
            growth::GrowthReport,
            growth::GrowthSet,
            growth::PeriodGrowth,
            growth::Trend,
            growth::DailySignups,
            retention::RetentionReport,
            retention::RetentionPoint,
            retention::ActivationSummary,
            retention::WeeklyCohort,
            retention::CohortRetention,
            retention::ActivationBucket,
            status::StatusReport,
            status::CacheStats,
            HealthReport,
            ConnectionStatus,
            ClientMetricsReport,
            MetricsSnapshot,
            RateLimitReport,
            Environment,
        )
    ),
    tags(
        (name = "overview", description = "Landing view"),
        (name = "users", description = "User activity, rankings and segments"),
        (name = "trips", description = "Trip totals, usage patterns and live activity"),
        (name = "reports", description = "Revenue, growth and retention"),
        (name = "status", description = "Connection health and maintenance"),
    )
)]
pub struct ApiDoc;
