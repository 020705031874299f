//! API error handling.

use std::time::Duration;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::RelayError;

/// Message returned for every unknown, expired or exhausted code.
pub const INVALID_CODE_MESSAGE: &str = "Invalid code";

/// API error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bad request (400).
    BadRequest,
    /// Unknown, expired or exhausted code (400).
    InvalidCode,
    /// Upload over the size cap (413).
    PayloadTooLarge,
    /// Admission denied (429).
    TooManyRequests,
    /// No code available (503).
    ServiceUnavailable,
    /// Internal server error (500).
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidCode => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Error detail.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    retry_after: Option<Duration>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// The generic invalid-code error.
    pub fn invalid_code() -> Self {
        Self::new(ErrorCode::InvalidCode, INVALID_CODE_MESSAGE)
    }

    /// Create a payload-too-large error for a cap of `max_bytes`.
    pub fn payload_too_large(max_bytes: u64) -> Self {
        Self::new(
            ErrorCode::PayloadTooLarge,
            format!("File too large (max {max_bytes} bytes)"),
        )
    }

    /// Create a rate-limited error with a retry hint.
    pub fn too_many_requests(retry_after: Duration) -> Self {
        Self {
            code: ErrorCode::TooManyRequests,
            message: "Too many requests. Please try again later.".to_string(),
            retry_after: Some(retry_after),
        }
    }

    /// Create an internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Error code of this error.
    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = self.retry_after {
            // Round up so clients never retry too early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, secs.max(1).into());
        }
        response
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::InvalidCode => ApiError::invalid_code(),
            RelayError::RateLimited { retry_after } => ApiError::too_many_requests(retry_after),
            RelayError::PayloadTooLarge { max, .. } => ApiError::payload_too_large(max),
            RelayError::Validation(msg) => ApiError::bad_request(msg),
            RelayError::CodeSpaceExhausted => {
                tracing::error!("No free access code available");
                ApiError::new(
                    ErrorCode::ServiceUnavailable,
                    "No access code available. Please try again later.",
                )
            }
            other => {
                tracing::error!("Internal error: {}", other);
                ApiError::internal("An internal error occurred")
            }
        }
    }
}
