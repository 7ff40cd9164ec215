//! Server-side handling of `metrics.Metrics` calls
//!
//! Maps each request message onto the [`MetricService`] and translates
//! storage errors into gRPC status codes.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{debug, instrument};

use crate::Metric as WireMetric;
use crate::service::MetricService;
use crate::storage::StorageError;

use super::proto::metrics_server::Metrics;
use super::proto::{
    AddMetricRequest, AddMetricResponse, AddMetricsRequest, AddMetricsResponse, GetMetricRequest,
    GetMetricResponse, ListMetricsRequest, ListMetricsResponse, Metric, PingRequest, PingResponse,
};

const SUCCESS: &str = "Success";

pub fn status_from(err: StorageError) -> Status {
    if err.is_client_error() {
        return Status::invalid_argument(err.to_string());
    }

    match err {
        StorageError::MetricNotFound { .. } => Status::not_found(err.to_string()),
        StorageError::Transient(_) | StorageError::Timeout(_) => {
            Status::unavailable(err.to_string())
        }
        _ => Status::internal(err.to_string()),
    }
}

#[derive(Clone)]
pub struct MetricsRpcHandler {
    service: Arc<MetricService>,
}

impl MetricsRpcHandler {
    pub fn new(service: Arc<MetricService>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl Metrics for MetricsRpcHandler {
    #[instrument(skip_all)]
    async fn add_metric(
        &self,
        request: Request<AddMetricRequest>,
    ) -> Result<Response<AddMetricResponse>, Status> {
        let metric = request
            .into_inner()
            .metric
            .ok_or_else(|| Status::invalid_argument("missing metric"))?;
        let metric = WireMetric::try_from(metric).map_err(status_from)?;

        let stored = self.service.add_metric(metric).await.map_err(status_from)?;

        Ok(Response::new(AddMetricResponse {
            metric: Some(Metric::from(&stored)),
            message: SUCCESS.to_string(),
        }))
    }

    #[instrument(skip_all, fields(count = request.get_ref().metrics.len()))]
    async fn add_metrics(
        &self,
        request: Request<AddMetricsRequest>,
    ) -> Result<Response<AddMetricsResponse>, Status> {
        let metrics = request
            .into_inner()
            .metrics
            .into_iter()
            .map(WireMetric::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(status_from)?;

        debug!("received {} metrics over rpc", metrics.len());
        self.service
            .add_multiple_metrics(metrics)
            .await
            .map_err(status_from)?;

        Ok(Response::new(AddMetricsResponse {
            message: SUCCESS.to_string(),
        }))
    }

    async fn get_metric(
        &self,
        request: Request<GetMetricRequest>,
    ) -> Result<Response<GetMetricResponse>, Status> {
        let request = request.into_inner();
        let metric = self
            .service
            .get_metric(&request.metric_type, &request.id)
            .await
            .map_err(status_from)?;

        Ok(Response::new(GetMetricResponse {
            metric: Some(Metric::from(&metric)),
        }))
    }

    async fn list_metrics(
        &self,
        _request: Request<ListMetricsRequest>,
    ) -> Result<Response<ListMetricsResponse>, Status> {
        let metrics = self.service.get_all_metrics().await.map_err(status_from)?;

        Ok(Response::new(ListMetricsResponse {
            metrics: metrics.iter().map(Metric::from).collect(),
        }))
    }

    async fn ping(
        &self,
        _request: Request<PingRequest>,
    ) -> Result<Response<PingResponse>, Status> {
        self.service.ping().await.map_err(status_from)?;
        Ok(Response::new(PingResponse {
            message: SUCCESS.to_string(),
        }))
    }
}
