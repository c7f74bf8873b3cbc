// Authentication and authorization error types

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::db::StoreError;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Missing authentication token")]
    MissingToken,

    /// Route is restricted to studio staff
    #[error("Staff access required")]
    StaffRequired,

    /// Staff password re-confirmation did not match
    #[error("Password is incorrect")]
    PasswordConfirmationFailed,

    #[error("Password hashing error")]
    PasswordHashError,

    #[error("Token generation error: {0}")]
    TokenGenerationError(String),

    #[error("User {0} not found")]
    UserNotFound(i32),

    #[error("A user with email {0} already exists")]
    EmailTaken(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::MissingToken => ApiError::Unauthorized(error.to_string()),
            AuthError::StaffRequired => ApiError::Forbidden(error.to_string()),
            AuthError::PasswordConfirmationFailed => ApiError::RuleViolation(error.to_string()),
            AuthError::UserNotFound(id) => ApiError::not_found("User", id),
            AuthError::EmailTaken(_) => ApiError::Conflict {
                message: error.to_string(),
            },
            AuthError::PasswordHashError | AuthError::TokenGenerationError(_) => {
                ApiError::Internal(error.to_string())
            }
            AuthError::Storage(e) => ApiError::from(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
