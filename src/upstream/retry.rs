// Retrying upstream decorator.
// Re-issues transient failures with exponential backoff.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::FetchError;

use super::Upstream;
use super::types::{Item, ItemId};

/// Retry policy with exponential backoff.
///
/// Only `UpstreamUnavailable` is retried. A missing item is an answer, not
/// a transient condition.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before retry number `attempt` (zero-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(error = %err, attempt = attempt + 1, ?delay, "retrying upstream call");
                    sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }
}

/// An [`Upstream`] that retries transient failures of the wrapped one.
pub struct Retrying<U> {
    inner: U,
    policy: RetryPolicy,
}

impl<U> Retrying<U> {
    pub fn new(inner: U, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &U {
        &self.inner
    }
}

#[async_trait]
impl<U: Upstream> Upstream for Retrying<U> {
    async fn list_top(&self) -> Result<Vec<ItemId>, FetchError> {
        self.policy.execute(|| self.inner.list_top()).await
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, FetchError> {
        self.policy.execute(|| self.inner.get_item(id)).await
    }
}
