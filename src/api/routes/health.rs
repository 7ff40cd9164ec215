//! Liveness endpoint

use axum::{extract::State, http::StatusCode};
use tracing::warn;

use crate::api::ApiState;

/// GET /ping
///
/// `Pong` while the storage backend answers, `500` otherwise.
pub async fn ping(State(state): State<ApiState>) -> (StatusCode, &'static str) {
    match state.service.ping().await {
        Ok(()) => (StatusCode::OK, "Pong"),
        Err(e) => {
            warn!("storage ping failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
        }
    }
}
