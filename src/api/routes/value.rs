//! Read endpoints

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::Deserialize;

use crate::Metric;
use crate::api::{ApiResult, ApiState};

use super::format_value;

/// Body of a JSON lookup; payload fields are ignored
#[derive(Debug, Deserialize)]
struct Lookup {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

/// POST /value/
pub async fn value_json(State(state): State<ApiState>, body: Bytes) -> ApiResult<Json<Metric>> {
    let lookup: Lookup = serde_json::from_slice(&body)?;
    let metric = state.service.get_metric(&lookup.kind, &lookup.id).await?;
    Ok(Json(metric))
}

/// GET /value/:type/:id
pub async fn value_path(
    State(state): State<ApiState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<String> {
    let metric = state.service.get_metric(&kind, &id).await?;
    Ok(format_value(&metric))
}

/// GET /
///
/// One `id:value` line per stored metric.
pub async fn list_metrics(State(state): State<ApiState>) -> ApiResult<String> {
    let metrics = state.service.get_all_metrics().await?;

    let mut listing = String::new();
    for metric in &metrics {
        listing.push_str(&metric.id);
        listing.push(':');
        listing.push_str(&format_value(metric));
        listing.push('\n');
    }
    Ok(listing)
}
