// HTTP handlers for vouchers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use validator::Validate;

use crate::auth::{AuthenticatedUser, StaffUser};
use crate::error::ApiError;
use crate::vouchers::models::{
    CreateVoucherRequest, RedeemVoucherRequest, RedemptionResponse, Voucher, VoucherKind,
    VoucherQuote,
};
use crate::AppState;

/// Price the signed-in user's unpaid bookings or blocks with a voucher
#[utoipa::path(
    get,
    path = "/api/vouchers/{kind}/{code}/quote",
    params(
        ("kind" = String, Path, description = "event or block"),
        ("code" = String, Path, description = "Voucher code")
    ),
    responses(
        (status = 200, description = "Quote; `valid` is false with the reason when the code cannot be used", body = VoucherQuote),
        (status = 400, description = "Invalid or missing code")
    ),
    tag = "vouchers"
)]
pub async fn quote_voucher(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((kind, code)): Path<(VoucherKind, String)>,
) -> Result<Json<VoucherQuote>, ApiError> {
    let quote = state
        .voucher_service
        .quote(kind, &code, user.user_id, Utc::now())
        .await?;
    Ok(Json(quote))
}

/// Create a voucher (staff)
#[utoipa::path(
    post,
    path = "/api/vouchers",
    request_body = CreateVoucherRequest,
    responses(
        (status = 201, description = "Voucher created", body = Voucher),
        (status = 400, description = "Invalid voucher"),
        (status = 409, description = "Code already exists")
    ),
    tag = "vouchers"
)]
pub async fn create_voucher(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
    Json(request): Json<CreateVoucherRequest>,
) -> Result<(StatusCode, Json<Voucher>), ApiError> {
    request.validate()?;
    let voucher = state
        .voucher_service
        .create(request, Utc::now().date_naive())
        .await?;
    Ok((StatusCode::CREATED, Json(voucher)))
}

/// Apply a voucher; fully discounted items are marked paid, the rest are priced
#[utoipa::path(
    post,
    path = "/api/vouchers/{kind}/{code}/redeem",
    params(
        ("kind" = String, Path, description = "event or block"),
        ("code" = String, Path, description = "Voucher code")
    ),
    request_body = RedeemVoucherRequest,
    responses(
        (status = 200, description = "Redemption result", body = RedemptionResponse),
        (status = 400, description = "Voucher cannot be used for these items")
    ),
    tag = "vouchers"
)]
pub async fn redeem_voucher(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((kind, code)): Path<(VoucherKind, String)>,
    Json(request): Json<RedeemVoucherRequest>,
) -> Result<Json<RedemptionResponse>, ApiError> {
    request.validate()?;
    let result = state
        .voucher_service
        .redeem(kind, &code, &user, request, Utc::now())
        .await?;
    Ok(Json(result))
}
