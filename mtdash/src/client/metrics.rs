//! Process-wide counters for the data access client.
//!
//! Counters live in atomics so concurrent reads never lose an update. Every update is mirrored to
//! the `metrics` facade, which the Prometheus exporter renders when metrics are enabled:
//!
//! - `mtdash_client_requests_total{outcome}` - completed reads by outcome
//! - `mtdash_client_retries_total` - retry attempts after transient failures
//! - `mtdash_client_request_duration_seconds` - read latency, including retries and waits

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use utoipa::ToSchema;

#[derive(Debug)]
pub struct ClientMetrics {
    total_calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    latency_micros: AtomicU64,
    started: ArcSwap<(Instant, DateTime<Utc>)>,
}

/// Point-in-time copy of the client counters.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    /// Cumulative latency of all calls, in milliseconds
    pub total_latency_ms: f64,
    /// Mean latency per call, in milliseconds
    pub average_latency_ms: Option<f64>,
    /// Successful calls as a percentage of all calls
    pub success_rate: Option<f64>,
    pub uptime_seconds: u64,
    #[schema(value_type = String, format = "date-time")]
    pub since: DateTime<Utc>,
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            latency_micros: AtomicU64::new(0),
            started: ArcSwap::from_pointee((Instant::now(), Utc::now())),
        }
    }

    /// Record a completed call (after any retries).
    pub fn record_call(&self, latency: Duration, success: bool) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        self.latency_micros.fetch_add(micros, Ordering::SeqCst);

        let outcome = if success {
            self.successes.fetch_add(1, Ordering::SeqCst);
            "success"
        } else {
            self.failures.fetch_add(1, Ordering::SeqCst);
            "failure"
        };

        counter!("mtdash_client_requests_total", "outcome" => outcome).increment(1);
        histogram!("mtdash_client_request_duration_seconds").record(latency.as_secs_f64());
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
        counter!("mtdash_client_retries_total").increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_calls = self.total_calls.load(Ordering::SeqCst);
        let successes = self.successes.load(Ordering::SeqCst);
        let total_latency_ms = self.latency_micros.load(Ordering::SeqCst) as f64 / 1000.0;
        let started = self.started.load();

        MetricsSnapshot {
            total_calls,
            successes,
            failures: self.failures.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
            total_latency_ms,
            average_latency_ms: (total_calls > 0).then(|| total_latency_ms / total_calls as f64),
            success_rate: (total_calls > 0).then(|| successes as f64 / total_calls as f64 * 100.0),
            uptime_seconds: started.0.elapsed().as_secs(),
            since: started.1,
        }
    }

    /// Zero every counter and restart the uptime clock.
    pub fn reset(&self) {
        self.total_calls.store(0, Ordering::SeqCst);
        self.successes.store(0, Ordering::SeqCst);
        self.failures.store(0, Ordering::SeqCst);
        self.retries.store(0, Ordering::SeqCst);
        self.latency_micros.store(0, Ordering::SeqCst);
        self.started.store(Arc::new((Instant::now(), Utc::now())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_derives_rates() {
        let metrics = ClientMetrics::new();
        assert_eq!(metrics.snapshot().success_rate, None);

        metrics.record_call(Duration::from_millis(10), true);
        metrics.record_call(Duration::from_millis(30), true);
        metrics.record_call(Duration::from_millis(20), false);
        metrics.record_retry();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_calls, 3);
        assert_eq!(snapshot.successes, 2);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.total_latency_ms, 60.0);
        assert_eq!(snapshot.average_latency_ms, Some(20.0));
        let rate = snapshot.success_rate.unwrap();
        assert!((rate - 66.666).abs() < 0.01);

        metrics.reset();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_calls, 0);
        assert_eq!(snapshot.retries, 0);
        assert_eq!(snapshot.total_latency_ms, 0.0);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let metrics = Arc::new(ClientMetrics::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_call(Duration::from_micros(1), true);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_calls, 8000);
        assert_eq!(snapshot.successes, 8000);
    }
}
