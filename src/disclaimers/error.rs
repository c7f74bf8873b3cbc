// Error types for the disclaimer lifecycle

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::auth::AuthError;
use crate::content::ContentError;
use crate::db::StoreError;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum DisclaimerError {
    #[error("Active disclaimer already exists")]
    ActiveDisclaimerExists,

    /// Cross-field or age check failed; the message is shown as-is
    #[error("{0}")]
    InvalidDetails(String),

    #[error("No disclaimer content has been published")]
    NoPublishedContent,

    #[error("Disclaimer {0} not found")]
    NotFound(i32),

    #[error("User {0} not found")]
    UserNotFound(i32),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for DisclaimerError {
    fn from(error: StoreError) -> Self {
        match error {
            // Backstop from the locked insert
            StoreError::Duplicate(_) => DisclaimerError::ActiveDisclaimerExists,
            other => DisclaimerError::Storage(other),
        }
    }
}

impl From<DisclaimerError> for ApiError {
    fn from(error: DisclaimerError) -> Self {
        match error {
            DisclaimerError::ActiveDisclaimerExists
            | DisclaimerError::InvalidDetails(_)
            | DisclaimerError::NoPublishedContent => ApiError::RuleViolation(error.to_string()),
            DisclaimerError::NotFound(id) => ApiError::not_found("Disclaimer", id),
            DisclaimerError::UserNotFound(id) => ApiError::not_found("User", id),
            DisclaimerError::Auth(e) => ApiError::from(e),
            DisclaimerError::Content(e) => ApiError::from(e),
            DisclaimerError::Storage(e) => ApiError::from(e),
        }
    }
}

impl IntoResponse for DisclaimerError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_duplicate_store_error_is_active_conflict() {
        let error = DisclaimerError::from(StoreError::Duplicate("x".into()));
        assert!(matches!(error, DisclaimerError::ActiveDisclaimerExists));
        assert_eq!(ApiError::from(error).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_password_failure_maps_to_auth_status() {
        let error = DisclaimerError::from(AuthError::PasswordConfirmationFailed);
        assert_eq!(ApiError::from(error).status_code(), StatusCode::BAD_REQUEST);
    }
}
