//! Retry-on-transient-failure for storage backends
//!
//! [`RetryingBackend`] wraps any backend and re-runs an operation when it
//! fails with [`StorageError::Transient`]. Every other error is returned
//! immediately. Writes are keyed upserts, so re-running one after an
//! ambiguous failure cannot create duplicate rows.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::MetricType;

use super::backend::StorageBackend;
use super::error::StorageResult;
use super::schema::InternalMetric;

/// Delays between attempts; one retry per entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Run `op` until it succeeds, fails permanently or the budget is spent.
    ///
    /// After the last retry the final transient error is returned.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded after {} retries", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.delays.len() => {
                    let delay = self.delays[attempt];
                    attempt += 1;
                    warn!(
                        "{} failed with transient error, retry {}/{} in {:?}: {}",
                        operation,
                        attempt,
                        self.delays.len(),
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    /// Three retries after 1s, 3s and 5s
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(1),
            Duration::from_secs(3),
            Duration::from_secs(5),
        ])
    }
}

/// Backend decorator applying a [`RetryPolicy`] to every data operation
///
/// `ping` and `close` run once: a liveness check should report the current
/// state rather than wait it out.
pub struct RetryingBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: StorageBackend> RetryingBackend<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for RetryingBackend<B> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn add_metric(&self, metric: InternalMetric) -> StorageResult<()> {
        self.policy
            .run("add_metric", || self.inner.add_metric(metric.clone()))
            .await
    }

    async fn add_multiple_metrics(&self, metrics: Vec<InternalMetric>) -> StorageResult<()> {
        self.policy
            .run("add_multiple_metrics", || {
                self.inner.add_multiple_metrics(metrics.clone())
            })
            .await
    }

    async fn get_metric(&self, kind: MetricType, id: &str) -> StorageResult<InternalMetric> {
        self.policy
            .run("get_metric", || self.inner.get_metric(kind, id))
            .await
    }

    async fn get_all_metrics(&self) -> StorageResult<Vec<InternalMetric>> {
        self.policy
            .run("get_all_metrics", || self.inner.get_all_metrics())
            .await
    }

    async fn ping(&self) -> StorageResult<()> {
        self.inner.ping().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}
