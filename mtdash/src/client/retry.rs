//! Retry with exponential backoff for transient read failures.

use super::errors::ClientError;
use super::metrics::ClientMetrics;
use super::query::{QueryDescriptor, ReadResponse};
use super::source::ReadSource;
use crate::config::ClientConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently to retry.
///
/// The delay before retry `n` (counting from zero) is `base_delay * backoff_factor^n`, capped at
/// `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(client: &ClientConfig, max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: client.retry_base_delay,
            backoff_factor: client.retry_backoff_factor,
            max_delay: client.retry_max_delay,
        }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = self.backoff_factor.saturating_pow(retry);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }
}

/// A [`ReadSource`] that retries transient failures of the wrapped source.
///
/// Permanent and data shape failures pass straight through. When the retries run out the last
/// transient failure is reported as [`ClientError::RetriesExhausted`].
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
    metrics: Arc<ClientMetrics>,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy, metrics: Arc<ClientMetrics>) -> Self {
        Self { inner, policy, metrics }
    }
}

#[async_trait]
impl<S: ReadSource> ReadSource for Retrying<S> {
    async fn read(&self, query: &QueryDescriptor) -> Result<ReadResponse, ClientError> {
        let mut retries = 0;
        loop {
            match self.inner.read(query).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => {
                    if retries >= self.policy.max_retries {
                        return Err(ClientError::RetriesExhausted {
                            attempts: retries + 1,
                            last_error: e.to_string(),
                        });
                    }

                    let delay = self.policy.delay_for(retries);
                    retries += 1;
                    self.metrics.record_retry();
                    warn!(
                        table = %query.table,
                        retry = retries,
                        "Transient failure, retrying in {:?}: {}", delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
