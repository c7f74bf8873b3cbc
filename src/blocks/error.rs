use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::db::StoreError;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Cannot assign a block to a booking for a cancelled event")]
    EventCancelled,

    #[error("Cannot assign a block to a cancelled booking")]
    BookingCancelled,

    #[error("Block is full")]
    BlockFull,

    #[error("Block is not paid or has expired")]
    BlockInactive,

    #[error("Block belongs to another user")]
    WrongUser,

    #[error("Block cannot be used for this event type")]
    EventTypeMismatch,

    #[error("Booking is already paid")]
    AlreadyPaid,

    #[error("Booking is already assigned to block {0}")]
    AlreadyOnBlock(i32),

    #[error("Booking is already cancelled")]
    AlreadyCancelled,

    #[error("Booking {0} not found")]
    BookingNotFound(i32),

    #[error("Block {0} not found")]
    BlockNotFound(i32),

    #[error("Booking belongs to another user")]
    NotYourBooking,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<BlockError> for ApiError {
    fn from(error: BlockError) -> Self {
        match error {
            BlockError::BookingNotFound(id) => ApiError::not_found("Booking", id),
            BlockError::BlockNotFound(id) => ApiError::not_found("Block", id),
            BlockError::NotYourBooking => ApiError::Forbidden(error.to_string()),
            BlockError::Storage(e) => ApiError::from(e),
            other => ApiError::RuleViolation(other.to_string()),
        }
    }
}

impl IntoResponse for BlockError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
