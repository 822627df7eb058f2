//! Time-bounded result cache for analytics panels.
//!
//! Entries are keyed by query name plus rendered parameters and expire passively after the
//! configured TTL. Concurrent misses for the same key each compute; only fresh panels are stored,
//! so a degraded panel is retried on the next request.

use crate::api::models::Panel;
use moka::future::Cache;
use std::any::Any;
use std::fmt::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: &'static str,
    params: String,
}

impl CacheKey {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            params: String::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl fmt::Display) -> Self {
        if !self.params.is_empty() {
            self.params.push('&');
        }
        let _ = write!(self.params, "{name}={value}");
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            f.write_str(self.query)
        } else {
            write!(f, "{}?{}", self.query, self.params)
        }
    }
}

type Entry = Arc<dyn Any + Send + Sync>;

pub struct QueryCache {
    name: &'static str,
    ttl: Duration,
    entries: Cache<CacheKey, Entry>,
}

impl QueryCache {
    pub fn new(name: &'static str, ttl: Duration, max_capacity: u64) -> Self {
        Self {
            name,
            ttl,
            entries: Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build(),
        }
    }

    /// Return the cached panel for `key`, or compute, store and return it.
    pub async fn panel<T, F, Fut>(&self, key: CacheKey, compute: F) -> Panel<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Panel<T>>,
    {
        if let Some(entry) = self.entries.get(&key).await
            && let Ok(panel) = entry.downcast::<Panel<T>>()
        {
            debug!(cache = self.name, %key, "Cache hit");
            metrics::counter!("mtdash_cache_hits_total", "cache" => self.name).increment(1);
            let mut panel = (*panel).clone();
            panel.cached = true;
            return panel;
        }

        debug!(cache = self.name, %key, "Cache miss");
        metrics::counter!("mtdash_cache_misses_total", "cache" => self.name).increment(1);
        let panel = compute().await;
        if panel.is_fresh() {
            self.entries.insert(key, Arc::new(panel.clone())).await;
        }
        panel
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
