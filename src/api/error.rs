//! Structured API error responses with error codes
//!
//! Every handler failure is rendered as
//! `{"error": {"code": "...", "numeric_code": ..., "message": "..."}}`
//! with the code repeated in an `x-error-code` header.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::infra::{ErrorKind, SealError};

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// The first nine mirror [`ErrorKind`] one to one; the remainder are produced
/// by the HTTP layer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation (1xxx)
    InvalidFormat,
    /// Body, path or query could not be decoded
    InvalidRequestBody,

    // Resources (2xxx)
    NotFound,
    Conflict,

    // Lifecycle (3xxx)
    InvalidState,
    Expired,
    ConcurrentModification,

    // Infrastructure (8xxx)
    KeyManagementFailure,
    DatabaseError,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::InvalidFormat => 1001,
            ErrorCode::InvalidRequestBody => 1002,

            ErrorCode::NotFound => 2001,
            ErrorCode::Conflict => 2002,

            ErrorCode::InvalidState => 3001,
            ErrorCode::Expired => 3002,
            ErrorCode::ConcurrentModification => 3003,

            ErrorCode::KeyManagementFailure => 8001,
            ErrorCode::DatabaseError => 8002,
            ErrorCode::ServiceUnavailable => 8003,
            ErrorCode::InternalError => 8999,
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidFormat | ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict
            | ErrorCode::InvalidState
            | ErrorCode::ConcurrentModification => StatusCode::CONFLICT,
            ErrorCode::Expired => StatusCode::GONE,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::KeyManagementFailure
            | ErrorCode::DatabaseError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::Expired => "EXPIRED",
            ErrorCode::ConcurrentModification => "CONCURRENT_MODIFICATION",
            ErrorCode::KeyManagementFailure => "KEY_MANAGEMENT_FAILURE",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidFormat => ErrorCode::InvalidFormat,
            ErrorKind::Conflict => ErrorCode::Conflict,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::InvalidState => ErrorCode::InvalidState,
            ErrorKind::Expired => ErrorCode::Expired,
            ErrorKind::KeyManagementFailure => ErrorCode::KeyManagementFailure,
            ErrorKind::ConcurrentModification => ErrorCode::ConcurrentModification,
            ErrorKind::Database => ErrorCode::DatabaseError,
            ErrorKind::Internal => ErrorCode::InternalError,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Related resource ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                details: None,
                resource_id: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code_str = self.error.code.as_str();
        let mut response = (status, Json(self)).into_response();

        response.headers_mut().insert(
            axum::http::header::HeaderName::from_static("x-error-code"),
            axum::http::HeaderValue::from_static(code_str),
        );

        response
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<SealError> for ApiError {
    fn from(err: SealError) -> Self {
        let code = ErrorCode::from(err.kind());

        match err {
            // Do not leak driver or key-material details to callers.
            SealError::Database(e) => {
                error!(error = %e, "Database error while serving request");
                ApiError::new(code, "database error")
            }
            SealError::KeyManagementFailure(msg) => {
                error!(error = %msg, "Key management failure while serving request");
                ApiError::new(code, "key management failure")
            }
            SealError::Configuration(_) | SealError::Internal(_) => {
                error!(error = %err, "Internal error while serving request");
                ApiError::new(code, "internal error")
            }
            SealError::InvalidState {
                seal_id,
                operation,
                status,
            } => ApiError::new(code, err.to_string())
            .with_resource_id(seal_id.to_string())
            .with_details(serde_json::json!({
                "operation": operation.to_string(),
                "status": status,
            })),
            SealError::ConcurrentModification {
                seal_id,
                expected_version,
            } => ApiError::new(
                code,
                format!("seal {seal_id} was modified concurrently, retry the request"),
            )
            .with_resource_id(seal_id.to_string())
            .with_details(serde_json::json!({ "expectedVersion": expected_version })),
            SealError::Expired(seal_id) => ApiError::new(code, err.to_string())
                .with_resource_id(seal_id.to_string()),
            SealError::SealNotFound(ref id) | SealError::ShipmentNotFound(ref id) => {
                let id = id.clone();
                ApiError::new(code, err.to_string()).with_resource_id(id)
            }
            SealError::InvalidFormat(_) | SealError::DuplicateSerialNumber(_) => {
                ApiError::new(code, err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(ErrorCode::InvalidRequestBody, rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::new(ErrorCode::InvalidRequestBody, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(ErrorCode::InvalidRequestBody, rejection.body_text())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Create a validation error with field details
pub fn validation_error(field: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::InvalidFormat, message.into())
        .with_details(serde_json::json!({ "field": field }))
}

/// Create a not found error for a specific resource type
pub fn not_found(resource_type: &str, id: impl std::fmt::Display) -> ApiError {
    ApiError::new(
        ErrorCode::NotFound,
        format!("{resource_type} not found: {id}"),
    )
    .with_resource_id(id.to_string())
}
