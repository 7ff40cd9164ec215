pub mod agent;
pub mod api;
pub mod codec;
pub mod config;
pub mod rpc;
pub mod service;
pub mod storage;
pub mod util;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Kind of a metric, deciding how reported values are folded into storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Instantaneous reading, last write wins
    Gauge,

    /// Running sum of all reported deltas
    Counter,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricType::Gauge),
            "counter" => Ok(MetricType::Counter),
            other => Err(StorageError::UnsupportedType(other.to_string())),
        }
    }
}

/// A metric as it travels between agent and hub.
///
/// Exactly one of `delta` (counters) or `value` (gauges) is expected to be
/// present, selected by `kind`. Use [`Metric::validate`] before folding a
/// decoded metric into storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: MetricType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricType::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricType::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// Check that the id is set and that exactly the payload field matching
    /// `kind` is present.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.id.is_empty() {
            return Err(StorageError::MissingField {
                id: String::new(),
                field: "id",
            });
        }

        match self.kind {
            MetricType::Counter if self.delta.is_none() => Err(StorageError::MissingField {
                id: self.id.clone(),
                field: "delta",
            }),
            MetricType::Gauge if self.value.is_none() => Err(StorageError::MissingField {
                id: self.id.clone(),
                field: "value",
            }),
            MetricType::Counter if self.value.is_some() => Err(StorageError::UnexpectedField {
                id: self.id.clone(),
                field: "value",
            }),
            MetricType::Gauge if self.delta.is_some() => Err(StorageError::UnexpectedField {
                id: self.id.clone(),
                field: "delta",
            }),
            _ => Ok(()),
        }
    }
}
