//! Request/response transforms applied around the route handlers
//!
//! - [`crypto`]: reverses chunked RSA-OAEP on request bodies
//! - [`integrity`]: checks inbound `HashSHA256` headers and signs responses

pub mod crypto;
pub mod integrity;

use axum::body::{Body, Bytes, to_bytes};

use super::{ApiError, MAX_BODY_BYTES};

/// Buffer a request body up to the API's size limit
pub(crate) async fn read_body(body: Body) -> Result<Bytes, ApiError> {
    to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("failed to read request body: {}", e)))
}
