use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No health check has run yet
    Disconnected,
    Connected,
    Error,
}

/// Outcome of a health probe against the data source.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthReport {
    pub reachable: bool,
    pub status: ConnectionStatus,
    pub latency_ms: f64,
    #[schema(value_type = String, format = "date-time")]
    pub checked_at: DateTime<Utc>,
    /// Failed probes in a row, reset by a successful one
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl HealthReport {
    /// Whether the report is recent enough to reuse.
    pub fn is_fresh(&self, max_age: std::time::Duration, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(max_age).is_ok_and(|max_age| now - self.checked_at < max_age)
    }
}
