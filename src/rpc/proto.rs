//! Messages and service stubs generated from `proto/metrics.proto`,
//! plus conversions to and from the JSON wire model

#![allow(clippy::doc_markdown)]

tonic::include_proto!("metrics");

use crate::storage::StorageError;
use crate::{Metric as WireMetric, MetricType};

impl From<&WireMetric> for Metric {
    fn from(metric: &WireMetric) -> Self {
        Self {
            id: metric.id.clone(),
            metric_type: metric.kind.as_str().to_string(),
            value: metric.value.unwrap_or_default(),
            delta: metric.delta.unwrap_or_default(),
        }
    }
}

impl TryFrom<Metric> for WireMetric {
    type Error = StorageError;

    fn try_from(metric: Metric) -> Result<Self, Self::Error> {
        Ok(match metric.metric_type.parse::<MetricType>()? {
            MetricType::Counter => WireMetric::counter(metric.id, metric.delta),
            MetricType::Gauge => WireMetric::gauge(metric.id, metric.value),
        })
    }
}
