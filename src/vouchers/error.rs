use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::blocks::BlockError;
use crate::db::StoreError;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum VoucherError {
    #[error("No code provided")]
    NoCodeProvided,

    #[error("Invalid code")]
    InvalidCode,

    /// The voucher exists but cannot be used now; the message is shown as-is
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    InvalidVoucher(String),

    #[error("Voucher code {0} already exists")]
    DuplicateCode(String),

    #[error("Item {0} is not one of your unpaid items")]
    ItemNotUnpaid(i32),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<VoucherError> for ApiError {
    fn from(error: VoucherError) -> Self {
        match error {
            VoucherError::DuplicateCode(_) => ApiError::Conflict {
                message: error.to_string(),
            },
            VoucherError::Block(e) => ApiError::from(e),
            VoucherError::Storage(e) => ApiError::from(e),
            other => ApiError::RuleViolation(other.to_string()),
        }
    }
}

impl IntoResponse for VoucherError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
