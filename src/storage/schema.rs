//! Storage representation of metrics and the relational schema
//!
//! Every backend stores [`InternalMetric`] rows: the metric id, its type and
//! the *absolute* value rendered as text. Numeric formatting and parsing
//! happens here, once, so that the memory, file and relational backends never
//! disagree about how a counter or gauge is spelled.
//!
//! ## Value encoding
//!
//! - Counters are decimal `i64` strings (`"8"`, `"-3"`)
//! - Gauges use the shortest representation that parses back to the same
//!   `f64` (`"7.25"`, `"0.1"`, `"1e300"` renders as its full decimal form)

use serde::{Deserialize, Serialize};

use crate::{Metric, MetricType};

use super::error::{StorageError, StorageResult};

/// A metric as held by a storage backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InternalMetric {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: MetricType,

    /// Absolute value (running sum for counters, last reading for gauges)
    pub value: String,
}

impl InternalMetric {
    pub fn counter(id: impl Into<String>, total: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricType::Counter,
            value: total.to_string(),
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricType::Gauge,
            value: value.to_string(),
        }
    }

    /// Parse the stored counter total
    pub fn counter_total(&self) -> StorageResult<i64> {
        self.value.parse().map_err(|_| self.corrupted())
    }

    /// Parse the stored gauge reading
    pub fn gauge_value(&self) -> StorageResult<f64> {
        self.value.parse().map_err(|_| self.corrupted())
    }

    /// Convert back into the wire form.
    ///
    /// A value that does not parse for its type means the stored data is
    /// corrupted; it is reported, never coerced.
    pub fn to_metric(&self) -> StorageResult<Metric> {
        match self.kind {
            MetricType::Counter => Ok(Metric::counter(self.id.clone(), self.counter_total()?)),
            MetricType::Gauge => Ok(Metric::gauge(self.id.clone(), self.gauge_value()?)),
        }
    }

    fn corrupted(&self) -> StorageError {
        StorageError::CorruptedValue {
            id: self.id.clone(),
            value: self.value.clone(),
        }
    }
}

/// Table holding one row per `(name, type)` key
pub const TABLE_NAME: &str = "metric_storage";

pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS metric_storage (
    name  varchar(50)      NOT NULL,
    type  varchar(20)      NOT NULL,
    value double precision NOT NULL,
    PRIMARY KEY (name, type)
)";

pub const UPSERT_METRIC: &str = "INSERT INTO metric_storage (name, type, value)
VALUES ($1, $2, $3)
ON CONFLICT (name, type) DO UPDATE SET value = excluded.value";

pub const SELECT_METRIC: &str =
    "SELECT name, type, value FROM metric_storage WHERE name = $1 AND type = $2";

pub const SELECT_ALL_METRICS: &str = "SELECT name, type, value FROM metric_storage";

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_snapshot_entry_shape() {
        let json = serde_json::to_string(&InternalMetric::counter("PollCount", 42)).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","value":"42"}"#);
    }

    #[test]
    fn test_gauge_text_round_trips() {
        for value in [0.1, 7.25, -3.5e-12, 1e300, f64::MIN_POSITIVE] {
            let stored = InternalMetric::gauge("g", value);
            assert_eq!(stored.gauge_value().unwrap(), value);
        }
    }

    #[test]
    fn test_to_metric() {
        assert_eq!(
            InternalMetric::counter("requests", 8).to_metric().unwrap(),
            Metric::counter("requests", 8)
        );
        assert_eq!(
            InternalMetric::gauge("cpu", 7.25).to_metric().unwrap(),
            Metric::gauge("cpu", 7.25)
        );
    }

    #[test]
    fn test_corrupted_value_is_reported() {
        let broken = InternalMetric {
            id: "requests".to_string(),
            kind: MetricType::Counter,
            value: "8.5".to_string(),
        };
        assert_matches!(
            broken.to_metric(),
            Err(StorageError::CorruptedValue { id, value }) if id == "requests" && value == "8.5"
        );
    }
}
