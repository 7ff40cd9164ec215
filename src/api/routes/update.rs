//! Write endpoints

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{debug, instrument};

use crate::api::{ApiError, ApiResult, ApiState};
use crate::{Metric, MetricType};

/// POST /update/
///
/// Folds one JSON metric into storage and answers with the stored result.
#[instrument(skip_all)]
pub async fn update_json(State(state): State<ApiState>, body: Bytes) -> ApiResult<Json<Metric>> {
    let metric: Metric = serde_json::from_slice(&body)?;
    let stored = state.service.add_metric(metric).await?;
    Ok(Json(stored))
}

/// POST /updates/
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn update_batch(State(state): State<ApiState>, body: Bytes) -> ApiResult<StatusCode> {
    let metrics: Vec<Metric> = serde_json::from_slice(&body)?;
    debug!("received batch of {} metrics", metrics.len());

    state.service.add_multiple_metrics(metrics).await?;
    Ok(StatusCode::OK)
}

/// POST /update/:type/:id/:value
pub async fn update_path(
    State(state): State<ApiState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    let metric = match kind.parse::<MetricType>()? {
        MetricType::Gauge => {
            let value = value.parse::<f64>().map_err(|_| {
                ApiError::InvalidRequest(format!("can't convert value {} to float64", value))
            })?;
            Metric::gauge(id, value)
        }
        MetricType::Counter => {
            let delta = value.parse::<i64>().map_err(|_| {
                ApiError::InvalidRequest(format!("can't convert value {} to int64", value))
            })?;
            Metric::counter(id, delta)
        }
    };

    state.service.add_metric(metric).await?;
    Ok(StatusCode::OK)
}
