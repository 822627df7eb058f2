//! Sliding window rate limiting for outbound reads.
//!
//! Calls beyond the ceiling wait for the oldest call in the window to age out. Nothing is ever
//! dropped.

use super::errors::ClientError;
use super::query::{QueryDescriptor, ReadResponse};
use super::source::ReadSource;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Caps the number of calls started within any one second window.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
    delayed: AtomicU64,
}

impl RateLimiter {
    pub fn per_second(max_calls: u32) -> Self {
        Self::new(max_calls, Duration::from_secs(1))
    }

    pub fn new(max_calls: u32, window: Duration) -> Self {
        let max_calls = max_calls.max(1) as usize;
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
            delayed: AtomicU64::new(0),
        }
    }

    /// Wait until a slot is free, then claim it.
    pub async fn acquire(&self) {
        let mut waited = false;
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
                    calls.pop_front();
                }

                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    None
                } else {
                    calls.front().map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                }
            };

            match wait {
                None => break,
                Some(wait) => {
                    if !waited {
                        waited = true;
                        self.delayed.fetch_add(1, Ordering::SeqCst);
                    }
                    trace!("Rate limit reached, waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Calls started within the current window.
    pub async fn recent_calls(&self) -> usize {
        let calls = self.calls.lock().await;
        let now = Instant::now();
        calls.iter().filter(|t| now.duration_since(**t) < self.window).count()
    }

    /// Calls that had to wait for a slot since start-up.
    pub fn delayed_calls(&self) -> u64 {
        self.delayed.load(Ordering::SeqCst)
    }
}

/// A [`ReadSource`] that claims a rate limit slot before every read.
pub struct RateLimited<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S> RateLimited<S> {
    pub fn new(inner: S, limiter: RateLimiter) -> Self {
        Self { inner, limiter }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

#[async_trait]
impl<S: ReadSource> ReadSource for RateLimited<S> {
    async fn read(&self, query: &QueryDescriptor) -> Result<ReadResponse, ClientError> {
        self.limiter.acquire().await;
        self.inner.read(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemorySource;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fifteen_calls_at_ten_per_second() {
        let limiter = RateLimiter::per_second(10);
        let start = Instant::now();

        let mut beyond_window = 0;
        for _ in 0..15 {
            limiter.acquire().await;
            if start.elapsed() >= Duration::from_secs(1) {
                beyond_window += 1;
            }
        }

        assert_eq!(beyond_window, 5);
        assert!(limiter.delayed_calls() >= 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_all_complete() {
        let source = InMemorySource::new();
        let limited = Arc::new(RateLimited::new(source.clone(), RateLimiter::per_second(10)));
        let start = Instant::now();

        let handles: Vec<_> = (0..15)
            .map(|_| {
                let limited = limited.clone();
                tokio::spawn(async move { limited.read(&QueryDescriptor::new("profiles")).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        // Every call reached the source, the last five a second later
        assert_eq!(source.calls(), 15);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(limited.limiter().delayed_calls() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::per_second(2);
        limiter.acquire().await;
        tokio::time::advance(Duration::from_millis(600)).await;
        limiter.acquire().await;
        assert_eq!(limiter.recent_calls().await, 2);

        // The first call ages out 400ms later, so the third waits only that long
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::from_millis(400));
        assert_eq!(limiter.recent_calls().await, 2);
    }
}
