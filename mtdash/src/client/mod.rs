//! Resilient access to the hosted trips database.
//!
//! [`DataClient`] is constructed once at start-up and shared through the application state. It
//! layers, from the outside in:
//!
//! 1. metrics and slow query logging ([`ClientMetrics`])
//! 2. retry with exponential backoff for transient failures ([`Retrying`])
//! 3. a sliding window rate limit that delays but never drops calls ([`RateLimited`])
//! 4. the raw read endpoint ([`ReadSource`], normally [`PostgrestSource`])
//!
//! Every retry attempt claims its own rate limit slot. Health probes go through the rate limit
//! but are never retried, so they report the state of the source as it is.
//!
//! ```no_run
//! # async fn example(config: mtdash::Config) -> anyhow::Result<()> {
//! use mtdash::client::{DataClient, QueryDescriptor};
//!
//! let client = DataClient::configure(&config, "staging")?;
//! let recent = client
//!     .execute_read(&QueryDescriptor::new("trips").order_by("created_at", true).limit(20))
//!     .await?;
//! println!("{} trips, health: {:?}", recent.rows.len(), client.health_check().await.status);
//! # Ok(())
//! # }
//! ```

mod errors;
mod health;
mod metrics;
mod query;
mod rate_limit;
mod retry;
mod source;

pub use errors::ClientError;
pub use health::{ConnectionStatus, HealthReport};
pub use metrics::{ClientMetrics, MetricsSnapshot};
pub use query::{Filter, FilterOp, Order, QueryDescriptor, ReadResponse, Row, timestamp};
pub use rate_limit::{RateLimited, RateLimiter};
pub use retry::{RetryPolicy, Retrying};
pub use source::{PostgrestSource, ReadSource};

use crate::config::{ClientConfig, Config, ConfigError, Environment};
use arc_swap::ArcSwapOption;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

type LimitedSource = Arc<RateLimited<Arc<dyn ReadSource>>>;

pub struct DataClient {
    environment: Environment,
    limited: LimitedSource,
    reader: Retrying<LimitedSource>,
    metrics: Arc<ClientMetrics>,
    last_health: ArcSwapOption<HealthReport>,
    consecutive_failures: AtomicU32,
    health_check_interval: Duration,
    slow_query_threshold: Duration,
    page_size: u32,
}

/// Client counters together with connection and rate limit state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClientMetricsReport {
    pub environment: Environment,
    pub connection_status: ConnectionStatus,
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub rate_limit: RateLimitReport,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RateLimitReport {
    pub calls_per_second: usize,
    /// Calls started within the last second
    pub recent_calls: usize,
    /// Calls that had to wait for a slot since start-up
    pub delayed_calls: u64,
}

impl DataClient {
    /// Build a client for a named environment of the configuration.
    ///
    /// Fails when the environment is unknown or its endpoint or key are missing.
    pub fn configure(config: &Config, environment: &str) -> Result<Self, ConfigError> {
        let environment: Environment = environment.parse()?;
        let settings = config.data_source_for(environment)?;
        let source = PostgrestSource::new(&settings)?;

        info!(
            "Data client configured for {} environment at {} ({} requests/s, {} retries)",
            environment, settings.url, config.client.requests_per_second, settings.max_retries
        );

        Ok(Self::new(Arc::new(source), environment, &config.client, settings.max_retries))
    }

    /// Build a client for the configuration's active environment.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::configure(config, &config.environment)
    }

    /// Assemble a client over any read source.
    pub fn new(source: Arc<dyn ReadSource>, environment: Environment, client: &ClientConfig, max_retries: u32) -> Self {
        let metrics = Arc::new(ClientMetrics::new());
        let limited = Arc::new(RateLimited::new(source, RateLimiter::per_second(client.requests_per_second)));
        let reader = Retrying::new(
            limited.clone(),
            RetryPolicy::from_config(client, max_retries),
            metrics.clone(),
        );

        Self {
            environment,
            limited,
            reader,
            metrics,
            last_health: ArcSwapOption::empty(),
            consecutive_failures: AtomicU32::new(0),
            health_check_interval: client.health_check_interval,
            slow_query_threshold: client.slow_query_threshold,
            page_size: client.page_size,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Issue a read, waiting for a rate limit slot and retrying transient failures.
    #[instrument(skip(self, query), fields(table = %query.table))]
    pub async fn execute_read(&self, query: &QueryDescriptor) -> Result<ReadResponse, ClientError> {
        let started = Instant::now();
        let result = self.reader.read(query).await;
        let elapsed = started.elapsed();

        self.metrics.record_call(elapsed, result.is_ok());

        if elapsed > self.slow_query_threshold {
            warn!(table = %query.table, "Slow query took {:?}", elapsed);
        }
        match &result {
            Ok(response) => debug!(rows = response.rows.len(), "Read from {} in {:?}", query.table, elapsed),
            Err(e) => warn!(table = %query.table, "Read failed after {:?}: {}", elapsed, e),
        }

        result
    }

    /// Read every matching row, paging with `limit`/`offset`.
    ///
    /// The hosted endpoint caps rows per response, so whole-table reads come back in pages. A
    /// query that already carries a limit is issued once as is.
    pub async fn read_all(&self, query: &QueryDescriptor) -> Result<Vec<Row>, ClientError> {
        if query.limit.is_some() {
            return Ok(self.execute_read(query).await?.rows);
        }

        // Offset paging needs a stable order
        let base = match query.order {
            Some(_) => query.clone(),
            None => query.clone().order_by("id", false),
        };

        let mut rows = Vec::new();
        let mut offset = 0u32;
        loop {
            let page = base.clone().limit(self.page_size).offset(offset);
            let response = self.execute_read(&page).await?;
            let fetched = response.rows.len();
            rows.extend(response.rows);

            if fetched < self.page_size as usize {
                break;
            }
            offset = offset.saturating_add(self.page_size);
        }

        Ok(rows)
    }

    /// Exact number of rows in a table.
    pub async fn count(&self, table: &str) -> Result<u64, ClientError> {
        let query = QueryDescriptor::new(table).select(["id"]).limit(1).with_count();
        let response = self.execute_read(&query).await?;
        response
            .total_count
            .ok_or_else(|| ClientError::data_shape(format!("no exact count returned for '{table}'")))
    }

    /// Probe the source with the cheapest possible read.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthReport {
        let probe = QueryDescriptor::new("profiles").select(["id"]).limit(1);
        let started = Instant::now();
        let result = self.limited.read(&probe).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let report = match result {
            Ok(_) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                HealthReport {
                    reachable: true,
                    status: ConnectionStatus::Connected,
                    latency_ms,
                    checked_at: Utc::now(),
                    consecutive_failures: 0,
                    error: None,
                    warning: None,
                }
            }
            // The endpoint answered, the schema is just not there yet
            Err(ClientError::Permanent { status: Some(404), message }) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                warn!("Data source reachable but profiles table is missing: {}", message);
                HealthReport {
                    reachable: true,
                    status: ConnectionStatus::Connected,
                    latency_ms,
                    checked_at: Utc::now(),
                    consecutive_failures: 0,
                    error: None,
                    warning: Some(format!("profiles table not found: {message}")),
                }
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(consecutive_failures = failures, "Health check failed: {}", e);
                HealthReport {
                    reachable: false,
                    status: ConnectionStatus::Error,
                    latency_ms,
                    checked_at: Utc::now(),
                    consecutive_failures: failures,
                    error: Some(e.to_string()),
                    warning: None,
                }
            }
        };

        self.last_health.store(Some(Arc::new(report.clone())));
        report
    }

    /// The last health report if it is recent enough, otherwise a fresh probe.
    pub async fn connection_status(&self) -> HealthReport {
        if let Some(report) = self.last_health.load_full()
            && report.is_fresh(self.health_check_interval, Utc::now())
        {
            return (*report).clone();
        }
        self.health_check().await
    }

    pub fn last_health(&self) -> Option<HealthReport> {
        self.last_health.load_full().map(|report| (*report).clone())
    }

    pub async fn metrics(&self) -> ClientMetricsReport {
        let limiter = self.limited.limiter();
        ClientMetricsReport {
            environment: self.environment,
            connection_status: self
                .last_health
                .load_full()
                .map_or(ConnectionStatus::Disconnected, |report| report.status),
            counters: self.metrics.snapshot(),
            rate_limit: RateLimitReport {
                calls_per_second: limiter.max_calls(),
                recent_calls: limiter.recent_calls().await,
                delayed_calls: limiter.delayed_calls(),
            },
        }
    }

    pub fn reset_metrics(&self) {
        info!("Resetting data client metrics");
        self.metrics.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{InMemorySource, profile_row, test_client, transient};
    use chrono::Utc;

    #[tokio::test(start_paused = true)]
    async fn test_execute_read_records_retries_and_outcome() {
        let source = InMemorySource::new();
        source.fail_next([transient(503), transient(502)]);
        let client = test_client(&source);

        let response = client.execute_read(&QueryDescriptor::new("trips")).await;
        assert!(response.is_ok());

        let snapshot = client.metrics().await.counters;
        assert_eq!(snapshot.total_calls, 1);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.retries, 2);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_read_failure_is_surfaced() {
        let source = InMemorySource::new();
        source.fail_next([ClientError::Permanent {
            status: Some(403),
            message: "permission denied".to_string(),
        }]);
        let client = test_client(&source);

        let err = client.execute_read(&QueryDescriptor::new("trips")).await.unwrap_err();
        assert!(matches!(err, ClientError::Permanent { status: Some(403), .. }));

        let snapshot = client.metrics().await.counters;
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.retries, 0);
    }

    #[tokio::test]
    async fn test_read_all_pages_through_table() {
        let source = InMemorySource::new();
        source.insert("profiles", (0..7).map(|_| profile_row("free", Utc::now())));
        let config = ClientConfig {
            page_size: 3,
            ..Default::default()
        };
        let client = DataClient::new(Arc::new(source.clone()), Environment::Testing, &config, 0);

        let rows = client.read_all(&QueryDescriptor::new("profiles")).await.unwrap();
        assert_eq!(rows.len(), 7);
        // Pages of 3, 3 and 1
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_count_uses_exact_total() {
        let source = InMemorySource::new();
        source.insert("profiles", (0..4).map(|_| profile_row("basic", Utc::now())));
        let client = test_client(&source);

        assert_eq!(client.count("profiles").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_health_check_reports_reachability() {
        let source = InMemorySource::new();
        let client = test_client(&source);
        assert_eq!(client.metrics().await.connection_status, ConnectionStatus::Disconnected);

        let report = client.health_check().await;
        assert!(report.reachable);
        assert_eq!(report.status, ConnectionStatus::Connected);
        assert!(report.latency_ms >= 0.0);

        source.fail_next([transient(503), transient(503)]);
        let report = client.health_check().await;
        assert!(!report.reachable);
        assert_eq!(report.status, ConnectionStatus::Error);
        let report = client.health_check().await;
        assert_eq!(report.consecutive_failures, 2);
        assert_eq!(client.metrics().await.connection_status, ConnectionStatus::Error);

        // Probes are not retried and do not count as reads
        assert_eq!(source.calls(), 3);
        assert_eq!(client.metrics().await.counters.total_calls, 0);
    }

    #[tokio::test]
    async fn test_missing_table_still_reachable() {
        let source = InMemorySource::new();
        source.fail_next([ClientError::Permanent {
            status: Some(404),
            message: "relation \"public.profiles\" does not exist".to_string(),
        }]);
        let client = test_client(&source);

        let report = client.health_check().await;
        assert!(report.reachable);
        assert!(report.warning.is_some());
    }

    #[tokio::test]
    async fn test_connection_status_reuses_recent_report() {
        let source = InMemorySource::new();
        let client = test_client(&source);

        client.connection_status().await;
        client.connection_status().await;
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_configure_rejects_unknown_environment() {
        let config = Config::default();
        let err = DataClient::configure(&config, "qa").err().unwrap();
        assert!(matches!(err, ConfigError::UnknownEnvironment { .. }));

        // Production has no credentials by default
        let err = DataClient::configure(&config, "production").err().unwrap();
        assert!(matches!(err, ConfigError::MissingCredentials { .. }));

        let client = DataClient::configure(&config, "testing").unwrap();
        assert_eq!(client.environment(), Environment::Testing);
    }
}
