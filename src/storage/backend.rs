//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` contract shared by the memory,
//! file-snapshotted and relational backends.

use async_trait::async_trait;

use crate::MetricType;

use super::error::StorageResult;
use super::schema::InternalMetric;

/// Trait for metric storage backends
///
/// Backends hold *absolute* values keyed by `(id, type)`: writing a metric
/// replaces whatever was stored under its key. Counter accumulation is done
/// by the aggregation layer above, which reads the current total and writes
/// back the new one.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as one backend instance is shared by
/// every request handler.
///
/// ## Error Handling
///
/// Transient failures are retried inside the backend (see
/// [`super::retry::RetryingBackend`]); whatever is returned has exhausted
/// that budget.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Upsert one metric
    async fn add_metric(&self, metric: InternalMetric) -> StorageResult<()>;

    /// Upsert a batch of metrics, all-or-nothing where the backend supports it
    ///
    /// Later entries win over earlier ones sharing the same key.
    async fn add_multiple_metrics(&self, metrics: Vec<InternalMetric>) -> StorageResult<()>;

    /// Point lookup by type and id
    ///
    /// Fails with `StorageError::MetricNotFound` when the key is absent.
    async fn get_metric(&self, kind: MetricType, id: &str) -> StorageResult<InternalMetric>;

    /// Every stored metric, in no particular order
    async fn get_all_metrics(&self) -> StorageResult<Vec<InternalMetric>>;

    /// Liveness check
    async fn ping(&self) -> StorageResult<()>;

    /// Flush pending state and release resources
    async fn close(&self) -> StorageResult<()>;
}
