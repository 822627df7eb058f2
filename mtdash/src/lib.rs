//! # mtdash: analytics service for the Mileage Tracker
//!
//! `mtdash` serves the business dashboard of the Mileage Tracker app. It reads two tables from the
//! app's hosted database, `profiles` (one row per registered user) and `trips` (every logged
//! journey), and turns them into JSON panels for a chart front-end: headline numbers, user
//! rankings and segments, usage patterns, revenue, growth and retention. It never writes to the
//! database.
//!
//! ## Architecture
//!
//! The service is an [Axum](https://github.com/tokio-rs/axum) application in three layers:
//!
//! The **data client** ([`client`]) is the only code that talks to the database. It issues reads
//! against the hosted REST endpoint, waits for a slot in a sliding window rate limit (10 calls a
//! second by default), retries transient failures with exponential backoff and counts every call.
//! It also probes the endpoint for health and remembers the result.
//!
//! The **query layer** ([`analytics`]) decodes rows into typed profiles and trips, aggregates
//! them in memory and caches each result for five minutes, keyed by query and parameters. When the
//! database cannot be read, a panel is still returned: empty, or partial when only one of its
//! sources failed, and flagged accordingly.
//!
//! The **API layer** ([`api`]) maps `/api/v1/*` routes onto query layer operations, validates
//! parameters and documents everything through OpenAPI at `/docs`.
//!
//! An optional background task ([`refresh`]) clears and rewarms the cache on an interval.
//!
//! ## Configuration
//!
//! Configuration is read from a YAML file and `MTDASH_*` environment variables, with the
//! database credentials also taken from the `SUPABASE_*` variables the mobile app tooling uses. See
//! [`config`] for details.

pub mod analytics;
pub mod api;
pub mod client;
pub mod config;
pub mod errors;
mod openapi;
pub mod refresh;
pub mod telemetry;
#[cfg(test)]
mod test_utils;
pub mod types;

use crate::analytics::Analytics;
use crate::client::DataClient;
use crate::openapi::ApiDoc;
use axum::{
    Json, Router,
    http::{self, HeaderValue},
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .client(client)
///     .analytics(analytics)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub client: Arc<DataClient>,
    pub analytics: Arc<Analytics>,
    pub prometheus: Option<PrometheusHandle>,
}

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// The process-wide Prometheus recorder, installed on first use.
fn prometheus_handle() -> PrometheusHandle {
    PROMETHEUS
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                warn!("Metrics recorder already installed, /internal/metrics will be empty: {}", e);
            }
            handle
        })
        .clone()
}

/// Create CORS layer from configuration. No configured origins allows any origin.
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origin = if config.cors_allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let origins = config
            .cors_allowed_origins
            .iter()
            .map(|origin| origin.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([http::Method::GET, http::Method::POST]))
}

/// Build the application router: dashboard API, OpenAPI docs, health and optional metrics.
pub fn build_router(state: &mut AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/overview", get(api::handlers::overview::get_overview))
        .route("/users/total", get(api::handlers::users::get_total_users))
        .route("/users/active", get(api::handlers::users::get_active_users))
        .route("/users/stats", get(api::handlers::users::get_user_stats))
        .route("/users/top", get(api::handlers::users::get_top_users))
        .route("/users/at-risk", get(api::handlers::users::get_users_at_risk))
        .route("/users/segments", get(api::handlers::users::get_user_segments))
        .route("/trips/summary", get(api::handlers::trips::get_trip_summary))
        .route("/trips/patterns", get(api::handlers::trips::get_usage_patterns))
        .route("/activity", get(api::handlers::trips::get_recent_activity))
        .route("/revenue", get(api::handlers::reports::get_revenue))
        .route("/growth", get(api::handlers::reports::get_growth))
        .route("/retention", get(api::handlers::reports::get_retention))
        .route("/status", get(api::handlers::status::get_status))
        .route("/status/metrics/reset", post(api::handlers::status::reset_metrics))
        .route("/cache/clear", post(api::handlers::status::clear_cache))
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    if state.config.enable_metrics {
        let handle = state.prometheus.get_or_insert_with(prometheus_handle).clone();
        router = router.route(
            "/internal/metrics",
            get(move || {
                let handle = handle.clone();
                async move {
                    handle.run_upkeep();
                    handle.render()
                }
            }),
        );
    }

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks that run alongside the HTTP server.
///
/// When dropped, the `drop_guard` cancels the shutdown token, signalling all tasks to stop.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: tokio_util::sync::CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

fn setup_background_services(
    analytics: Arc<Analytics>,
    config: &Config,
    shutdown_token: tokio_util::sync::CancellationToken,
) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    if config.refresh.enabled {
        background_tasks.push(tokio::spawn(refresh::run_refresh(
            analytics,
            config.refresh.clone(),
            shutdown_token.clone(),
        )));
    } else {
        debug!("Cache refresh disabled");
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// The configured service: router, shared state and background tasks.
///
/// 1. **Create**: [`Application::new`] builds the data client for the active environment, probes
///    the data source once and starts background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests
/// 3. **Shutdown**: when the shutdown signal resolves, stops background tasks and flushes telemetry
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting dashboard with configuration: {:#?}", config);

        let client = Arc::new(DataClient::from_config(&config)?);
        Self::with_client(config, client).await
    }

    /// Create an application around an already constructed data client.
    pub async fn with_client(config: Config, client: Arc<DataClient>) -> anyhow::Result<Self> {
        let health = client.health_check().await;
        if health.reachable {
            info!(
                environment = %client.environment(),
                "Data source reachable in {:.0}ms",
                health.latency_ms
            );
        } else {
            warn!(
                environment = %client.environment(),
                "Data source unreachable at startup: {}",
                health.error.as_deref().unwrap_or("unknown error")
            );
        }

        let analytics = Arc::new(Analytics::new(client.clone(), &config.cache, config.analytics.clone()));
        let shutdown_token = tokio_util::sync::CancellationToken::new();
        let bg_services = setup_background_services(analytics.clone(), &config, shutdown_token);

        let mut app_state = AppState::builder()
            .config(config.clone())
            .client(client)
            .analytics(analytics)
            .build();
        let router = build_router(&mut app_state)?;

        Ok(Self {
            router,
            app_state,
            config,
            bg_services,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.app_state
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Dashboard listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.bg_services.shutdown().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{Environment, RefreshConfig};
    use crate::test_utils::{InMemorySource, profile_row, test_client, test_config, test_server};
    use axum::http::StatusCode;
    use chrono::Utc;
    use std::time::Duration;

    #[test_log::test(tokio::test)]
    async fn test_application_serves_health_and_api() {
        let source = InMemorySource::new();
        source.insert("profiles", [profile_row("pro", Utc::now())]);
        let app = Application::with_client(test_config(), Arc::new(test_client(&source)))
            .await
            .expect("Application should build");

        assert_eq!(app.state().client.environment(), Environment::Testing);
        // Startup probe
        assert!(app.state().client.last_health().is_some_and(|h| h.reachable));

        let (server, bg_services) = app.into_test_server();
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "OK");

        let response = server.get("/api/v1/revenue").await;
        response.assert_status_ok();

        server.get("/api/v1/unknown").await.assert_status(StatusCode::NOT_FOUND);
        bg_services.shutdown().await;
    }

    #[tokio::test]
    async fn test_application_starts_with_unreachable_source() {
        let source = InMemorySource::new();
        source.fail_table("profiles", crate::test_utils::transient(503));
        let app = Application::with_client(test_config(), Arc::new(test_client(&source)))
            .await
            .expect("An unreachable source should not prevent startup");

        assert!(app.state().client.last_health().is_some_and(|h| !h.reachable));
    }

    #[tokio::test]
    async fn test_refresh_task_stops_on_shutdown() {
        let source = InMemorySource::new();
        let config = Config {
            refresh: RefreshConfig {
                enabled: true,
                interval: Duration::from_secs(3600),
            },
            ..test_config()
        };
        let app = Application::with_client(config, Arc::new(test_client(&source)))
            .await
            .unwrap();
        let (_server, bg_services) = app.into_test_server();
        assert_eq!(bg_services.background_tasks.len(), 1);

        tokio::time::timeout(Duration::from_secs(5), bg_services.shutdown())
            .await
            .expect("background tasks should stop");
    }

    #[tokio::test]
    async fn test_openapi_and_docs() {
        let server = test_server(&InMemorySource::new());

        let response = server.get("/api-docs/openapi.json").await;
        response.assert_status_ok();
        let spec = response.text();
        assert!(spec.contains("\"openapi\""));
        assert!(spec.contains("Mileage Tracker Dashboard API"));

        server.get("/docs").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_metrics_endpoint_follows_config() {
        let source = InMemorySource::new();
        let server = test_server(&source);
        // Record something so the exporter has output
        server.get("/api/v1/trips/summary").await.assert_status_ok();
        let response = server.get("/internal/metrics").await;
        response.assert_status_ok();
        assert!(response.text().contains("mtdash_client_requests_total"));

        let mut state = crate::test_utils::test_state(&source);
        state.config.enable_metrics = false;
        let router = build_router(&mut state).unwrap();
        let server = axum_test::TestServer::new(router).unwrap();
        server.get("/internal/metrics").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let source = InMemorySource::new();
        let mut state = crate::test_utils::test_state(&source);
        state.config.cors_allowed_origins = vec!["https://dash.example.com".to_string()];
        let router = build_router(&mut state).unwrap();
        let server = axum_test::TestServer::new(router).unwrap();

        let response = server
            .get("/healthz")
            .add_header(http::header::ORIGIN, HeaderValue::from_static("https://dash.example.com"))
            .await;
        assert_eq!(
            response.headers().get(http::header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://dash.example.com"
        );

        state.config.cors_allowed_origins = vec!["not a header\n".to_string()];
        assert!(build_router(&mut state).is_err());
    }
}
