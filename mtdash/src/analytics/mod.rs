//! The Query Layer: dashboard panels computed from `profiles` and `trips`.
//!
//! Each operation reads through the shared [`DataClient`], aggregates in memory and returns a
//! [`Panel`]. Results are cached per (query, parameters) for the configured TTL; the live activity
//! feed has its own, shorter-lived cache.
//!
//! Read failures never surface as errors here. A panel whose sources cannot be read is returned
//! empty and flagged unavailable, and a panel built from two sources keeps whatever the healthy
//! source provides, flagged partial. Degraded panels are not cached.

pub mod aggregate;
pub mod cache;
pub mod models;

use crate::api::models::Panel;
use crate::api::models::growth::GrowthReport;
use crate::api::models::overview::Overview;
use crate::api::models::retention::RetentionReport;
use crate::api::models::revenue::RevenueReport;
use crate::api::models::status::CacheStats;
use crate::api::models::trips::{ActivityEntry, TripSummary, UsagePatterns};
use crate::api::models::users::{ActiveUsers, AtRiskReport, SegmentReport, TotalUsers, UserTripStats};
use crate::client::{ClientError, DataClient, QueryDescriptor, timestamp};
use crate::config::{AnalyticsConfig, CacheConfig};
use crate::types::ProfileId;
use cache::{CacheKey, QueryCache};
use chrono::{DateTime, TimeDelta, Utc};
use models::{PROFILE_COLUMNS, Profile, TRIP_COLUMNS, Trip, decode_rows};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const PROFILES: &str = "profiles";
pub const TRIPS: &str = "trips";

pub struct Analytics {
    client: Arc<DataClient>,
    cache: QueryCache,
    live_cache: QueryCache,
    settings: AnalyticsConfig,
}

fn settle<T: Default>(query: &'static str, result: Result<T, ClientError>) -> Panel<T> {
    match result {
        Ok(data) => Panel::fresh(data),
        Err(e) => {
            warn!(query, error = %e, "Data unavailable, serving empty panel");
            Panel::unavailable(T::default(), e.to_string())
        }
    }
}

fn source_failed(query: &'static str, source: &'static str, error: &ClientError) {
    warn!(query, source, error = %error, "Source unavailable, serving partial panel");
}

impl Analytics {
    pub fn new(client: Arc<DataClient>, cache: &CacheConfig, settings: AnalyticsConfig) -> Self {
        Self {
            client,
            cache: QueryCache::new("analytics", cache.ttl, cache.max_capacity),
            live_cache: QueryCache::new("live", cache.live_ttl, cache.max_capacity),
            settings,
        }
    }

    pub fn settings(&self) -> &AnalyticsConfig {
        &self.settings
    }

    async fn profiles(&self) -> Result<Vec<Profile>, ClientError> {
        let query = QueryDescriptor::new(PROFILES).select(PROFILE_COLUMNS.iter().copied());
        decode_rows(PROFILES, self.client.read_all(&query).await?)
    }

    async fn trips(&self) -> Result<Vec<Trip>, ClientError> {
        let query = QueryDescriptor::new(TRIPS).select(TRIP_COLUMNS.iter().copied());
        decode_rows(TRIPS, self.client.read_all(&query).await?)
    }

    async fn trips_since(&self, since: DateTime<Utc>) -> Result<Vec<Trip>, ClientError> {
        let query = QueryDescriptor::new(TRIPS)
            .select(TRIP_COLUMNS.iter().copied())
            .gte("created_at", timestamp(since));
        decode_rows(TRIPS, self.client.read_all(&query).await?)
    }

    async fn profiles_and_trips(&self) -> Result<(Vec<Profile>, Vec<Trip>), ClientError> {
        let (profiles, trips) = tokio::join!(self.profiles(), self.trips());
        Ok((profiles?, trips?))
    }

    /// Number of registered profiles.
    #[instrument(skip(self))]
    pub async fn total_users(&self) -> Panel<TotalUsers> {
        self.cache
            .panel(CacheKey::new("total_users"), || async {
                settle(
                    "total_users",
                    self.client.count(PROFILES).await.map(|total_users| TotalUsers { total_users }),
                )
            })
            .await
    }

    /// Distinct users with a trip in the last `days` days.
    #[instrument(skip(self))]
    pub async fn active_users(&self, days: u32) -> Panel<ActiveUsers> {
        let key = CacheKey::new("active_users").param("days", days);
        self.cache
            .panel(key, || async {
                let now = Utc::now();
                let since = now - TimeDelta::days(i64::from(days));
                settle(
                    "active_users",
                    self.trips_since(since).await.map(|trips| ActiveUsers {
                        window_days: days,
                        active_users: aggregate::active_user_count(&trips, now, days),
                    }),
                )
            })
            .await
    }

    /// Landing view: user totals, activity, trip summary, engagement and alerts.
    #[instrument(skip(self))]
    pub async fn overview(&self, days: u32) -> Panel<Overview> {
        let key = CacheKey::new("overview").param("days", days);
        self.cache
            .panel(key, || async {
                let now = Utc::now();
                let (total, trips) = tokio::join!(self.client.count(PROFILES), self.trips());

                let mut unavailable = Vec::new();
                let total_users = total
                    .inspect_err(|e| {
                        source_failed("overview", PROFILES, e);
                        unavailable.push(PROFILES.to_string());
                    })
                    .ok();
                let trips = trips
                    .inspect_err(|e| {
                        source_failed("overview", TRIPS, e);
                        unavailable.push(TRIPS.to_string());
                    })
                    .ok();

                let engagement = trips
                    .as_deref()
                    .map(|t| aggregate::engagement(t, now, self.settings.at_risk_inactivity_days));
                let overview = Overview {
                    total_users,
                    window_days: days,
                    active_users: trips.as_deref().map(|t| aggregate::active_user_count(t, now, days)),
                    active_today: trips.as_deref().map(|t| aggregate::active_today(t, now)),
                    trips: trips.as_deref().map(|t| aggregate::trip_summary(t, now)),
                    alerts: aggregate::alerts(total_users, engagement.as_ref()),
                    engagement,
                };

                match unavailable.len() {
                    0 => Panel::fresh(overview),
                    2 => Panel::unavailable(Overview::default(), "profiles and trips are unavailable"),
                    _ => Panel::partial(overview, unavailable),
                }
            })
            .await
    }

    /// Per-user trip aggregates for every profile.
    #[instrument(skip(self))]
    pub async fn user_stats(&self) -> Panel<Vec<UserTripStats>> {
        self.cache
            .panel(CacheKey::new("user_stats"), || async {
                let (profiles, trips) = tokio::join!(self.profiles(), self.trips());
                let profiles = match profiles {
                    Ok(profiles) => profiles,
                    Err(e) => return settle("user_stats", Err(e)),
                };
                match trips {
                    Ok(trips) => Panel::fresh(aggregate::user_stats(&profiles, &trips, Utc::now())),
                    Err(e) => {
                        source_failed("user_stats", TRIPS, &e);
                        Panel::partial(aggregate::user_stats(&profiles, &[], Utc::now()), vec![TRIPS.to_string()])
                    }
                }
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn top_users(&self, limit: usize, include_inactive: bool) -> Panel<Vec<UserTripStats>> {
        let key = CacheKey::new("top_users")
            .param("limit", limit)
            .param("include_inactive", include_inactive);
        self.cache
            .panel(key, || async {
                settle(
                    "top_users",
                    self.profiles_and_trips().await.map(|(profiles, trips)| {
                        let stats = aggregate::user_stats(&profiles, &trips, Utc::now());
                        aggregate::top_users(stats, limit, include_inactive)
                    }),
                )
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn users_at_risk(&self, inactivity_days: u32) -> Panel<AtRiskReport> {
        let key = CacheKey::new("users_at_risk").param("inactivity_days", inactivity_days);
        self.cache
            .panel(key, || async {
                settle(
                    "users_at_risk",
                    self.profiles_and_trips().await.map(|(profiles, trips)| {
                        let stats = aggregate::user_stats(&profiles, &trips, Utc::now());
                        aggregate::users_at_risk(&stats, inactivity_days)
                    }),
                )
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn user_segments(&self) -> Panel<SegmentReport> {
        self.cache
            .panel(CacheKey::new("user_segments"), || async {
                settle(
                    "user_segments",
                    self.profiles_and_trips()
                        .await
                        .map(|(profiles, trips)| aggregate::segments(&aggregate::user_stats(&profiles, &trips, Utc::now()))),
                )
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn trip_summary(&self) -> Panel<TripSummary> {
        self.cache
            .panel(CacheKey::new("trip_summary"), || async {
                settle(
                    "trip_summary",
                    self.trips().await.map(|trips| aggregate::trip_summary(&trips, Utc::now())),
                )
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn usage_patterns(&self, days: u32) -> Panel<UsagePatterns> {
        let key = CacheKey::new("usage_patterns").param("days", days);
        self.cache
            .panel(key, || async {
                // The monthly trend covers every trip, so read them all
                settle(
                    "usage_patterns",
                    self.trips()
                        .await
                        .map(|trips| aggregate::usage_patterns(&trips, Utc::now(), days)),
                )
            })
            .await
    }

    /// Week, month and quarter growth of registrations and trips, plus daily sign-ups.
    #[instrument(skip(self))]
    pub async fn growth(&self) -> Panel<GrowthReport> {
        self.cache
            .panel(CacheKey::new("growth"), || async {
                let now = Utc::now();
                let (profiles, trips) = tokio::join!(self.profiles(), self.trips());
                let mut report = GrowthReport::default();
                let mut unavailable = Vec::new();

                match profiles {
                    Ok(profiles) => {
                        let registered: Vec<DateTime<Utc>> = profiles.iter().filter_map(|p| p.created_at).collect();
                        report.users = Some(aggregate::growth_set(&registered, now));
                        report.daily_signups =
                            aggregate::daily_signups(&profiles, now, aggregate::SIGNUP_HISTORY_DAYS);
                    }
                    Err(e) => {
                        source_failed("growth", PROFILES, &e);
                        unavailable.push(PROFILES.to_string());
                    }
                }
                match trips {
                    Ok(trips) => {
                        let recorded: Vec<DateTime<Utc>> = trips.iter().filter_map(Trip::activity_at).collect();
                        report.trips = Some(aggregate::growth_set(&recorded, now));
                    }
                    Err(e) => {
                        source_failed("growth", TRIPS, &e);
                        unavailable.push(TRIPS.to_string());
                    }
                }

                match unavailable.len() {
                    0 => Panel::fresh(report),
                    2 => Panel::unavailable(report, "profiles and trips are unavailable"),
                    _ => Panel::partial(report, unavailable),
                }
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn retention(&self) -> Panel<RetentionReport> {
        self.cache
            .panel(CacheKey::new("retention"), || async {
                settle(
                    "retention",
                    self.profiles_and_trips()
                        .await
                        .map(|(profiles, trips)| aggregate::retention(&profiles, &trips, Utc::now())),
                )
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn revenue(&self) -> Panel<RevenueReport> {
        self.cache
            .panel(CacheKey::new("revenue"), || async {
                settle(
                    "revenue",
                    self.profiles()
                        .await
                        .map(|profiles| aggregate::revenue(&profiles, &self.settings.pricing)),
                )
            })
            .await
    }

    /// The latest trips with their owners, cached for the live TTL only.
    #[instrument(skip(self))]
    pub async fn recent_trips(&self, limit: usize) -> Panel<Vec<ActivityEntry>> {
        let key = CacheKey::new("recent_trips").param("limit", limit);
        self.live_cache
            .panel(key, || async {
                let query = QueryDescriptor::new(TRIPS)
                    .select(TRIP_COLUMNS.iter().copied())
                    .order_by("created_at", true)
                    .limit(u32::try_from(limit).unwrap_or(u32::MAX));
                let trips: Vec<Trip> = match self.client.execute_read(&query).await {
                    Ok(response) => match decode_rows(TRIPS, response.rows) {
                        Ok(trips) => trips,
                        Err(e) => return settle("recent_trips", Err(e)),
                    },
                    Err(e) => return settle("recent_trips", Err(e)),
                };

                let owner_ids: HashSet<ProfileId> = trips.iter().map(|t| t.user_id).collect();
                if owner_ids.is_empty() {
                    return Panel::fresh(Vec::new());
                }
                let owners_query = QueryDescriptor::new(PROFILES)
                    .select(PROFILE_COLUMNS.iter().copied())
                    .in_list("id", owner_ids);
                let owners = match self.client.read_all(&owners_query).await {
                    Ok(rows) => decode_rows::<Profile>(PROFILES, rows),
                    Err(e) => Err(e),
                };

                match owners {
                    Ok(owners) => {
                        let owners: HashMap<ProfileId, Profile> = owners.into_iter().map(|p| (p.id, p)).collect();
                        Panel::fresh(aggregate::activity_feed(&trips, &owners))
                    }
                    Err(e) => {
                        source_failed("recent_trips", PROFILES, &e);
                        Panel::partial(aggregate::activity_feed(&trips, &HashMap::new()), vec![PROFILES.to_string()])
                    }
                }
            })
            .await
    }

    /// Drop every cached result, live feed included.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.live_cache.clear();
        info!("Analytics cache cleared");
    }

    pub async fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.entry_count().await,
            ttl_seconds: self.cache.ttl().as_secs(),
            live_entries: self.live_cache.entry_count().await,
            live_ttl_seconds: self.live_cache.ttl().as_secs(),
        }
    }
}
