//! Periodic cache refresh.
//!
//! When `refresh.enabled` is set, a background task clears the analytics cache on every tick and
//! recomputes the main dashboard panels, so the first viewer after a refresh gets cached data.

use crate::analytics::Analytics;
use crate::config::RefreshConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Clear the cache and recompute the landing panels. Returns how many came back degraded.
pub async fn refresh_once(analytics: &Analytics) -> usize {
    analytics.clear_cache();

    let settings = analytics.settings();
    let (overview, summary, growth, revenue, retention, activity) = tokio::join!(
        analytics.overview(settings.active_window_days),
        analytics.trip_summary(),
        analytics.growth(),
        analytics.revenue(),
        analytics.retention(),
        analytics.recent_trips(settings.recent_trips_limit),
    );

    let fresh = [
        overview.is_fresh(),
        summary.is_fresh(),
        growth.is_fresh(),
        revenue.is_fresh(),
        retention.is_fresh(),
        activity.is_fresh(),
    ];
    fresh.iter().filter(|fresh| !**fresh).count()
}

/// Run [`refresh_once`] on every tick of `config.interval` until `shutdown` is cancelled.
pub async fn run_refresh(analytics: Arc<Analytics>, config: RefreshConfig, shutdown: CancellationToken) {
    info!("Starting cache refresh every {:?}", config.interval);

    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Cache refresh shutting down");
                break;
            }
            _ = interval.tick() => {
                match refresh_once(&analytics).await {
                    0 => debug!("Refreshed dashboard panels"),
                    degraded => warn!(degraded, "Refreshed dashboard panels with degraded data"),
                }
            }
        }
    }
}
