//! API error types.

use crate::process::ProcessError;
use crate::staging::StagingError;
use crate::status::StatusChannelError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("core error: {0}")]
    Core(#[from] airlock_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
            Self::Staging(_) => "staging_error",
            Self::Core(_) => "bad_request",
            Self::Process(e) => match e {
                ProcessError::Incomplete { .. } => "incomplete_upload",
                ProcessError::DigestMismatch { .. } => "digest_mismatch",
                ProcessError::Staging(_) => "staging_error",
                ProcessError::Extract(_) => "extraction_failed",
                ProcessError::WorkerSpawn(_) => "worker_spawn_failed",
                ProcessError::Manifest(_) => "manifest_write_failed",
                ProcessError::Status(e) => match e {
                    StatusChannelError::ConnectTimeout => "status_connect_timeout",
                    StatusChannelError::DisconnectedEarly => "worker_disconnected",
                    StatusChannelError::MalformedFrame(_) => "malformed_status_frame",
                    StatusChannelError::WorkerReported(_) => "worker_failed",
                    StatusChannelError::Io(_) => "status_io_error",
                },
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Staging(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Process(e) => match e {
                ProcessError::Incomplete { .. } => StatusCode::BAD_REQUEST,
                ProcessError::DigestMismatch { .. } => StatusCode::BAD_REQUEST,
                ProcessError::Status(StatusChannelError::ConnectTimeout) => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                ProcessError::Status(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_channel_errors_map_to_distinct_codes() {
        let timeout = ApiError::Process(ProcessError::Status(StatusChannelError::ConnectTimeout));
        let disconnect =
            ApiError::Process(ProcessError::Status(StatusChannelError::DisconnectedEarly));
        let reported = ApiError::Process(ProcessError::Status(
            StatusChannelError::WorkerReported("boom".to_string()),
        ));

        assert_eq!(timeout.code(), "status_connect_timeout");
        assert_eq!(disconnect.code(), "worker_disconnected");
        assert_eq!(reported.code(), "worker_failed");
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn digest_mismatch_is_client_visible() {
        let err = ApiError::Process(ProcessError::DigestMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        });
        assert_eq!(err.code(), "digest_mismatch");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
