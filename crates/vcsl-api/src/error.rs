//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`StatusError`] kinds to HTTP status codes and returns JSON bodies
//! with a stable error code, a message, and the identifiers the caller
//! needs. Operational faults (storage, signing, contention) are logged and
//! returned redacted. Quota exhaustion is a 507 but keeps its details.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use vcsl_core::{ErrorKind, StatusError};

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. `DUPLICATE_ERROR`).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Identifiers relevant to the failure, absent for operational faults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request body or query could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No credential presented (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Failure raised by the issuance or status engine.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Internal server error (500). Message is logged but not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Status(err) => {
                let kind = err.kind();
                let status = match kind {
                    ErrorKind::Validation | ErrorKind::Data => StatusCode::BAD_REQUEST,
                    ErrorKind::Duplicate | ErrorKind::InvalidState => StatusCode::CONFLICT,
                    ErrorKind::QuotaExceeded => StatusCode::INSUFFICIENT_STORAGE,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::NotAllowed => StatusCode::FORBIDDEN,
                    ErrorKind::Signing => StatusCode::BAD_GATEWAY,
                    ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorKind::Conflict | ErrorKind::Contention => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                (status, kind.code())
            }
        }
    }

    /// Whether the failure is an operational fault whose message must not
    /// leave the service.
    pub fn is_internal(&self) -> bool {
        match self {
            Self::Internal(_) => true,
            Self::Status(err) => matches!(
                err.kind(),
                ErrorKind::Storage
                    | ErrorKind::Signing
                    | ErrorKind::Contention
                    | ErrorKind::Conflict
            ),
            Self::BadRequest(_) | Self::Unauthorized(_) => false,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Status(StatusError::Data { value, .. }) => Some(json!({ "value": value })),
            Self::Status(StatusError::Duplicate { credential_id }) => {
                Some(json!({ "credentialId": credential_id }))
            }
            Self::Status(StatusError::QuotaExceeded {
                allocator,
                purpose,
                list_count,
            }) => Some(json!({
                "indexAllocator": allocator,
                "statusPurpose": purpose,
                "listCount": list_count,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, details) = if self.is_internal() {
            tracing::error!(error = %self, code, "request failed");
            ("An internal error occurred".to_string(), None)
        } else {
            (self.to_string(), self.details())
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}
