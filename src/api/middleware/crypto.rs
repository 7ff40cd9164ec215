//! Body decryption middleware

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};
use tracing::trace;

use crate::api::ApiError;
use crate::codec::encryption::Decryptor;

use super::read_body;

/// Replace a non-empty request body with its decrypted plaintext
///
/// Runs after gzip decoding, so the body it sees is the raw ciphertext.
pub async fn decrypt_body(
    State(decryptor): State<Arc<Decryptor>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();
    let ciphertext = read_body(body).await?;

    if ciphertext.is_empty() {
        return Ok(next.run(Request::from_parts(parts, Body::empty())).await);
    }

    let plaintext = decryptor.decrypt(&ciphertext)?;
    trace!("decrypted {} -> {} bytes", ciphertext.len(), plaintext.len());

    parts.headers.remove(CONTENT_LENGTH);
    Ok(next.run(Request::from_parts(parts, Body::from(plaintext))).await)
}
