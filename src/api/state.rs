//! Shared state handed to every API handler

use std::sync::Arc;

use crate::service::MetricService;

#[derive(Clone)]
pub struct ApiState {
    /// Aggregation service all handlers write through
    pub service: Arc<MetricService>,
}

impl ApiState {
    pub fn new(service: Arc<MetricService>) -> Self {
        Self { service }
    }
}
