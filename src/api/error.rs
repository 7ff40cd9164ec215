//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::codec::CodecError;
use crate::storage::StorageError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Aggregation or storage failure
    Storage(StorageError),

    /// Request body or path could not be understood
    InvalidRequest(String),

    /// Integrity header does not match the body
    Integrity,

    /// Body could not be decrypted
    Payload(CodecError),

    /// Internal server error
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Storage(StorageError::MetricNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Storage(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidRequest(_) | ApiError::Integrity | ApiError::Payload(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Storage(err) => write!(f, "{}", err),
            ApiError::InvalidRequest(msg) | ApiError::Internal(msg) => write!(f, "{}", msg),
            ApiError::Integrity => write!(f, "{}", CodecError::IntegrityMismatch),
            ApiError::Payload(err) => write!(f, "{}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err)
    }
}

impl From<CodecError> for ApiError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::IntegrityMismatch => ApiError::Integrity,
            other => ApiError::Payload(other),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidRequest(format!("malformed metric payload: {}", err))
    }
}
