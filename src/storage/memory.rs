//! In-memory storage backend (no persistence)
//!
//! Metrics live in a single map keyed by `(type, id)` behind an async
//! `RwLock`. It's useful for:
//! - Testing without database dependencies
//! - Deployments that explicitly disable the snapshot file
//! - As the state holder inside [`super::file::FileBackend`]

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use crate::MetricType;

use super::backend::StorageBackend;
use super::error::{StorageError, StorageResult};
use super::schema::InternalMetric;

type Key = (MetricType, String);

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    metrics: RwLock<HashMap<Key, String>>,
}

impl MemoryBackend {
    /// Create a new, empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole content with `metrics`
    ///
    /// Used when restoring a snapshot: values are taken as absolute, never
    /// added to what was there before.
    pub async fn replace_all(&self, metrics: Vec<InternalMetric>) {
        let mut map = self.metrics.write().await;
        map.clear();
        for metric in metrics {
            map.insert((metric.kind, metric.id), metric.value);
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn add_metric(&self, metric: InternalMetric) -> StorageResult<()> {
        trace!("storing {} {} = {}", metric.kind, metric.id, metric.value);
        self.metrics
            .write()
            .await
            .insert((metric.kind, metric.id), metric.value);
        Ok(())
    }

    async fn add_multiple_metrics(&self, metrics: Vec<InternalMetric>) -> StorageResult<()> {
        // one write guard for the whole batch so readers never see half of it
        let mut map = self.metrics.write().await;
        for metric in metrics {
            map.insert((metric.kind, metric.id), metric.value);
        }
        Ok(())
    }

    async fn get_metric(&self, kind: MetricType, id: &str) -> StorageResult<InternalMetric> {
        self.metrics
            .read()
            .await
            .get(&(kind, id.to_string()))
            .map(|value| InternalMetric {
                id: id.to_string(),
                kind,
                value: value.clone(),
            })
            .ok_or_else(|| StorageError::MetricNotFound {
                kind,
                id: id.to_string(),
            })
    }

    async fn get_all_metrics(&self) -> StorageResult<Vec<InternalMetric>> {
        Ok(self
            .metrics
            .read()
            .await
            .iter()
            .map(|((kind, id), value)| InternalMetric {
                id: id.clone(),
                kind: *kind,
                value: value.clone(),
            })
            .collect())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        trace!("closing in-memory backend (no-op)");
        Ok(())
    }
}
