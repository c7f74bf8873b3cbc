// Error types for versioned content

use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::StoreError;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum ContentError {
    /// New version repeats the latest version's text
    #[error("No changes made from previous version; new version must update {0}")]
    NoChanges(&'static str),

    #[error("New version must be greater than current version {latest}")]
    VersionNotIncremented { latest: Decimal },

    #[error("Version must be greater than 0 (got {0})")]
    InvalidVersion(Decimal),

    /// Attempt to change the text of a published version
    #[error("Field {0} is read only.")]
    ReadOnly(&'static str),

    #[error("Version {0} not found")]
    VersionNotFound(Decimal),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<ContentError> for ApiError {
    fn from(error: ContentError) -> Self {
        match error {
            ContentError::NoChanges(_)
            | ContentError::VersionNotIncremented { .. }
            | ContentError::InvalidVersion(_) => ApiError::RuleViolation(error.to_string()),
            ContentError::ReadOnly(_) => ApiError::Conflict {
                message: error.to_string(),
            },
            ContentError::VersionNotFound(version) => ApiError::not_found("Content version", version),
            ContentError::Storage(e) => ApiError::from(e),
        }
    }
}

impl IntoResponse for ContentError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
