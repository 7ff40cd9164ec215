//! Aggregation service
//!
//! Bridges wire-typed [`Metric`]s and the backends' [`InternalMetric`] rows:
//!
//! - counters are read back (absent means `0`), summed with the reported
//!   delta and written as the new absolute total
//! - gauges are written as-is, overwriting the previous reading
//!
//! Every read-modify-write runs under one async mutex, so concurrent
//! counter reports for the same key are never lost.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::storage::{InternalMetric, StorageBackend, StorageError, StorageResult};
use crate::{Metric, MetricType};

pub struct MetricService {
    backend: Arc<dyn StorageBackend>,
    write_lock: Mutex<()>,
}

impl MetricService {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    /// Fold one metric into storage and return the stored result
    #[instrument(skip(self, metric), fields(id = %metric.id, kind = %metric.kind))]
    pub async fn add_metric(&self, metric: Metric) -> StorageResult<Metric> {
        metric.validate()?;

        let _guard = self.write_lock.lock().await;

        let stored = match metric.kind {
            MetricType::Counter => {
                let current = self.current_total(&metric.id).await?;
                let total = checked_total(&metric.id, current, metric.delta.unwrap_or_default())?;
                InternalMetric::counter(metric.id, total)
            }
            MetricType::Gauge => {
                InternalMetric::gauge(metric.id, metric.value.unwrap_or_default())
            }
        };

        self.backend.add_metric(stored.clone()).await?;
        stored.to_metric()
    }

    /// Fold a whole batch into storage with a single backend call.
    ///
    /// Every metric is validated before anything is written. Counter deltas
    /// sharing an id are summed first, so each counter key is read once;
    /// for gauges the last occurrence wins.
    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    pub async fn add_multiple_metrics(&self, metrics: Vec<Metric>) -> StorageResult<()> {
        for metric in &metrics {
            metric.validate()?;
        }

        if metrics.is_empty() {
            return Ok(());
        }

        let mut counter_deltas: Vec<(String, i64)> = Vec::new();
        let mut counter_index: HashMap<String, usize> = HashMap::new();
        let mut gauges: Vec<(String, f64)> = Vec::new();
        let mut gauge_index: HashMap<String, usize> = HashMap::new();

        for metric in metrics {
            match metric.kind {
                MetricType::Counter => {
                    let delta = metric.delta.unwrap_or_default();
                    match counter_index.get(&metric.id) {
                        Some(&i) => {
                            let sum = checked_total(&metric.id, counter_deltas[i].1, delta)?;
                            counter_deltas[i].1 = sum;
                        }
                        None => {
                            counter_index.insert(metric.id.clone(), counter_deltas.len());
                            counter_deltas.push((metric.id, delta));
                        }
                    }
                }
                MetricType::Gauge => {
                    let value = metric.value.unwrap_or_default();
                    match gauge_index.get(&metric.id) {
                        Some(&i) => gauges[i].1 = value,
                        None => {
                            gauge_index.insert(metric.id.clone(), gauges.len());
                            gauges.push((metric.id, value));
                        }
                    }
                }
            }
        }

        let _guard = self.write_lock.lock().await;

        let mut stored = Vec::with_capacity(counter_deltas.len() + gauges.len());
        for (id, delta) in counter_deltas {
            let current = self.current_total(&id).await?;
            let total = checked_total(&id, current, delta)?;
            stored.push(InternalMetric::counter(id, total));
        }
        stored.extend(
            gauges
                .into_iter()
                .map(|(id, value)| InternalMetric::gauge(id, value)),
        );

        debug!("writing {} aggregated metrics", stored.len());
        self.backend.add_multiple_metrics(stored).await
    }

    /// Point lookup; `kind` is the textual type from the request
    pub async fn get_metric(&self, kind: &str, id: &str) -> StorageResult<Metric> {
        let kind: MetricType = kind.parse()?;
        self.backend.get_metric(kind, id).await?.to_metric()
    }

    /// Every stored metric, sorted by id then type
    pub async fn get_all_metrics(&self) -> StorageResult<Vec<Metric>> {
        let mut metrics = self
            .backend
            .get_all_metrics()
            .await?
            .iter()
            .map(InternalMetric::to_metric)
            .collect::<StorageResult<Vec<_>>>()?;

        metrics.sort_by(|a, b| (&a.id, a.kind).cmp(&(&b.id, b.kind)));
        Ok(metrics)
    }

    pub async fn ping(&self) -> StorageResult<()> {
        self.backend.ping().await
    }

    /// Flush and release the backend
    pub async fn close(&self) -> StorageResult<()> {
        self.backend.close().await
    }

    async fn current_total(&self, id: &str) -> StorageResult<i64> {
        match self.backend.get_metric(MetricType::Counter, id).await {
            Ok(stored) => stored.counter_total(),
            Err(StorageError::MetricNotFound { .. }) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

fn checked_total(id: &str, total: i64, delta: i64) -> StorageResult<i64> {
    total
        .checked_add(delta)
        .ok_or_else(|| StorageError::CounterOverflow {
            id: id.to_string(),
            total,
            delta,
        })
}
