//! HMAC-SHA256 integrity middleware

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::codec::signing;

use super::read_body;

/// `HashSHA256` in its canonical lowercase form
pub const HASH_HEADER_NAME: HeaderName = HeaderName::from_static("hashsha256");

/// Shared secret used for both directions
#[derive(Clone)]
pub struct IntegrityKey(Arc<[u8]>);

impl IntegrityKey {
    pub fn new(secret: &str) -> Self {
        Self(Arc::from(secret.as_bytes()))
    }
}

/// Verify the `HashSHA256` header of a request, then sign the response
///
/// Requests without the header pass through unchecked. A mismatch is
/// rejected before the body reaches any handler.
pub async fn verify_integrity(
    State(key): State<IntegrityKey>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let signature = request
        .headers()
        .get(&HASH_HEADER_NAME)
        .map(|value| value.to_str().map(str::to_owned));

    let request = match signature {
        None => request,
        Some(Err(_)) => return Err(ApiError::Integrity),
        Some(Ok(signature)) => {
            let (parts, body) = request.into_parts();
            let bytes = read_body(body).await?;

            if let Err(e) = signing::verify(&key.0, &bytes, &signature) {
                warn!("rejecting request to {}: {}", parts.uri, e);
                return Err(e.into());
            }
            Request::from_parts(parts, Body::from(bytes))
        }
    };

    let response = next.run(request).await;
    sign_response(&key, response).await
}

async fn sign_response(key: &IntegrityKey, response: Response) -> Result<Response, ApiError> {
    if !response.status().is_success() {
        return Ok(response);
    }

    let (mut parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to buffer response: {}", e)))?;

    let signature = signing::sign(&key.0, &bytes)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    match HeaderValue::from_str(&signature) {
        Ok(value) => {
            parts.headers.insert(HASH_HEADER_NAME, value);
        }
        Err(e) => debug!("unsigned response: {}", e),
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}
