// HTTP handlers for block bookings

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::auth::AuthenticatedUser;
use crate::blocks::models::{BlockAllocationResponse, CancellationResponse};
use crate::error::ApiError;
use crate::AppState;

/// Pay for a booking with the user's eligible block
///
/// Returns the booking unchanged with `block_id: null` when no block fits.
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/block",
    params(("id" = i32, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Allocation result", body = BlockAllocationResponse),
        (status = 400, description = "Booking or event cancelled, or booking already paid"),
        (status = 403, description = "Booking belongs to another user"),
        (status = 404, description = "Booking not found")
    ),
    tag = "bookings"
)]
pub async fn allocate_block(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<i32>,
) -> Result<Json<BlockAllocationResponse>, ApiError> {
    let result = state
        .block_service
        .allocate(&user, booking_id, Utc::now())
        .await?;
    Ok(Json(result))
}

/// Pay for a booking with a chosen block
#[utoipa::path(
    put,
    path = "/api/bookings/{id}/block/{block_id}",
    params(
        ("id" = i32, Path, description = "Booking id"),
        ("block_id" = i32, Path, description = "Block id")
    ),
    responses(
        (status = 200, description = "Booking assigned", body = BlockAllocationResponse),
        (status = 400, description = "Block full, inactive or not usable for this booking"),
        (status = 404, description = "Booking or block not found")
    ),
    tag = "bookings"
)]
pub async fn assign_block(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((booking_id, block_id)): Path<(i32, i32)>,
) -> Result<Json<BlockAllocationResponse>, ApiError> {
    let result = state
        .block_service
        .assign(&user, booking_id, block_id, Utc::now())
        .await?;
    Ok(Json(result))
}

/// Cancel a booking
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/cancel",
    params(("id" = i32, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking cancelled", body = CancellationResponse),
        (status = 400, description = "Booking already cancelled"),
        (status = 404, description = "Booking not found")
    ),
    tag = "bookings"
)]
pub async fn cancel_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<i32>,
) -> Result<Json<CancellationResponse>, ApiError> {
    Ok(Json(
        state
            .block_service
            .cancel(&user, booking_id, Utc::now())
            .await?,
    ))
}
