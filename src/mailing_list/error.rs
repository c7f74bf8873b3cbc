use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::db::StoreError;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum MailingListError {
    #[error("Unexpected List ID")]
    UnexpectedListId,

    #[error("Unknown webhook type {0}")]
    UnknownAction(String),

    #[error("User with email {0} not found")]
    UserNotFound(String),

    #[error("User with email {0} already exists")]
    EmailTaken(String),

    #[error("Missing webhook field {0}")]
    MissingField(&'static str),

    #[error("Mailing list is not configured")]
    NotConfigured,

    #[error("Mailing list request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mailing list API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<MailingListError> for ApiError {
    fn from(error: MailingListError) -> Self {
        match error {
            MailingListError::Storage(e) => ApiError::from(e),
            MailingListError::Http(_) | MailingListError::Api { .. } | MailingListError::NotConfigured => {
                ApiError::Internal(error.to_string())
            }
            other => ApiError::RuleViolation(other.to_string()),
        }
    }
}

impl IntoResponse for MailingListError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
