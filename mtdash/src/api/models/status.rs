use crate::client::{ClientMetricsReport, HealthReport};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CacheStats {
    pub entries: u64,
    pub ttl_seconds: u64,
    pub live_entries: u64,
    pub live_ttl_seconds: u64,
}

/// Connection health, client counters and cache state in one view.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusReport {
    pub health: HealthReport,
    pub client: ClientMetricsReport,
    pub cache: CacheStats,
}
