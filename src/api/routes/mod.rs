//! Route handlers grouped by endpoint family

pub mod health;
pub mod update;
pub mod value;

use crate::{Metric, MetricType};

/// Plain-text rendering of a stored value
///
/// Gauges keep at most three decimals with trailing zeros trimmed; counters
/// print as integers.
pub fn format_value(metric: &Metric) -> String {
    match metric.kind {
        MetricType::Counter => metric.delta.unwrap_or_default().to_string(),
        MetricType::Gauge => {
            let text = format!("{:.3}", metric.value.unwrap_or_default());
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        }
    }
}
