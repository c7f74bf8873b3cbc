// Error handling module for the studio API
// Provides the crate-wide error type and its HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::db::StoreError;

/// Main error type for the API
/// All handlers return Result<T, ApiError>; domain errors convert into it.
#[derive(Debug)]
pub enum ApiError {
    /// Request DTO failed `validator` checks
    /// Maps to HTTP 400 Bad Request
    InvalidRequest(validator::ValidationErrors),

    /// A business rule rejected the operation (duplicate active disclaimer,
    /// exhausted voucher, full block, ...)
    /// Maps to HTTP 400 Bad Request
    RuleViolation(String),

    /// Resource not found by ID or code
    /// Maps to HTTP 404 Not Found
    NotFound { resource: String, id: String },

    /// Duplicate or otherwise conflicting resource
    /// Maps to HTTP 409 Conflict
    Conflict { message: String },

    /// Storage failures
    /// Maps to HTTP 500; details stay in the logs
    Storage(StoreError),

    /// Any other internal failure
    /// Maps to HTTP 500; details stay in the logs
    Internal(String),

    /// Authentication failures
    /// Maps to HTTP 401 Unauthorized
    Unauthorized(String),

    /// Authorization failures
    /// Maps to HTTP 403 Forbidden
    Forbidden(String),
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "RULE_VIOLATION", "NOT_FOUND")
    pub error_code: String,

    /// Human-readable error message
    pub message: String,

    /// Field-level validation errors when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// RFC 3339 timestamp of when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    fn new(error_code: &str, message: String, details: Option<serde_json::Value>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message,
            details,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_error_response();
        (status, Json(body)).into_response()
    }
}

impl ApiError {
    /// Build a not-found error for a resource type and identifier
    pub fn not_found(resource: &str, id: impl ToString) -> Self {
        ApiError::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    /// Convert to HTTP status code and ErrorResponse
    ///
    /// Logging follows severity:
    /// - error!: storage and internal failures (500-level)
    /// - warn!: rule violations, conflicts and auth failures
    /// - debug!: malformed requests and lookups that found nothing
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::InvalidRequest(errors) => {
                debug!("Request validation failed: {:?}", errors);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new(
                        "VALIDATION_ERROR",
                        "Request validation failed".to_string(),
                        Some(serde_json::to_value(errors).unwrap_or(serde_json::json!({}))),
                    ),
                )
            }
            ApiError::RuleViolation(message) => {
                warn!("Rule violation: {}", message);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new("RULE_VIOLATION", message.clone(), None),
                )
            }
            ApiError::NotFound { resource, id } => {
                debug!("Resource not found: {} with id {}", resource, id);
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::new(
                        "NOT_FOUND",
                        format!("{} with id {} not found", resource, id),
                        None,
                    ),
                )
            }
            ApiError::Conflict { message } => {
                warn!("Conflict error: {}", message);
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::new("CONFLICT", message.clone(), None),
                )
            }
            ApiError::Storage(store_error) => {
                error!("Storage error: {:?}", store_error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(
                        "DATABASE_ERROR",
                        "A database error occurred".to_string(),
                        None,
                    ),
                )
            }
            ApiError::Internal(internal_msg) => {
                error!("Internal error: {}", internal_msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(
                        "INTERNAL_ERROR",
                        "An internal server error occurred".to_string(),
                        None,
                    ),
                )
            }
            ApiError::Unauthorized(message) => {
                warn!("Unauthorized access attempt: {}", message);
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse::new("UNAUTHORIZED", message.clone(), None),
                )
            }
            ApiError::Forbidden(message) => {
                warn!("Forbidden access attempt: {}", message);
                (
                    StatusCode::FORBIDDEN,
                    ErrorResponse::new("FORBIDDEN", message.clone(), None),
                )
            }
        }
    }

    /// HTTP status code for this error without building the body
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::RuleViolation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Duplicate(message) => ApiError::Conflict { message },
            other => ApiError::Storage(other),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        ApiError::Storage(StoreError::Database(error))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::InvalidRequest(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::RuleViolation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::not_found("Voucher", "ABC").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Conflict { message: "dup".into() }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_not_exposed() {
        let (status, body) = ApiError::Internal("connection string leaked".into()).to_error_response();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("connection string"));
    }

    #[test]
    fn test_duplicate_store_error_becomes_conflict() {
        let error: ApiError = StoreError::Duplicate("code already used".into()).into();
        assert!(matches!(error, ApiError::Conflict { .. }));
    }

    #[test]
    fn test_rule_violation_message_passed_through() {
        let (_, body) = ApiError::RuleViolation("Voucher code has expired".into()).to_error_response();
        assert_eq!(body.error_code, "RULE_VIOLATION");
        assert_eq!(body.message, "Voucher code has expired");
        assert!(body.details.is_none());
    }
}
