// HTTP handlers for disclaimer endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use validator::Validate;

use crate::auth::{AuthenticatedUser, StaffUser};
use crate::disclaimers::models::{
    ArchivedDisclaimer, DeleteDisclaimerResponse, DisclaimerStatusResponse, NonRegisteredDisclaimer,
    NonRegisteredDisclaimerRequest, OnlineDisclaimer, PrintDisclaimer, PrintDisclaimerRequest,
    SignDisclaimerRequest, UpdateDisclaimerRequest,
};
use crate::error::ApiError;
use crate::AppState;

/// Sign an online disclaimer against the current content version
#[utoipa::path(
    post,
    path = "/api/disclaimers",
    request_body = SignDisclaimerRequest,
    responses(
        (status = 201, description = "Disclaimer signed", body = OnlineDisclaimer),
        (status = 400, description = "Invalid answers, wrong password or active disclaimer exists"),
        (status = 401, description = "Not logged in")
    ),
    tag = "disclaimers"
)]
pub async fn sign_disclaimer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<SignDisclaimerRequest>,
) -> Result<(StatusCode, Json<OnlineDisclaimer>), ApiError> {
    request.validate()?;
    let created = state
        .disclaimer_service
        .sign(user.user_id, request, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Disclaimer status of the signed-in user
#[utoipa::path(
    get,
    path = "/api/disclaimers/me/status",
    responses((status = 200, description = "Disclaimer status", body = DisclaimerStatusResponse)),
    tag = "disclaimers"
)]
pub async fn my_disclaimer_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<DisclaimerStatusResponse>, ApiError> {
    Ok(Json(state.disclaimer_service.status(user.user_id).await?))
}

/// Disclaimer for a single event, no account needed
#[utoipa::path(
    post,
    path = "/api/disclaimers/non-registered",
    request_body = NonRegisteredDisclaimerRequest,
    responses(
        (status = 201, description = "Disclaimer recorded", body = NonRegisteredDisclaimer),
        (status = 400, description = "Invalid answers or name confirmation")
    ),
    tag = "disclaimers"
)]
pub async fn create_non_registered_disclaimer(
    State(state): State<AppState>,
    Json(request): Json<NonRegisteredDisclaimerRequest>,
) -> Result<(StatusCode, Json<NonRegisteredDisclaimer>), ApiError> {
    request.validate()?;
    let created = state
        .disclaimer_service
        .create_non_registered(request, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Edit a user's disclaimer (staff, password re-entry required)
#[utoipa::path(
    put,
    path = "/api/studioadmin/disclaimers/{id}",
    params(("id" = i32, Path, description = "Online disclaimer id")),
    request_body = UpdateDisclaimerRequest,
    responses(
        (status = 200, description = "Disclaimer updated", body = OnlineDisclaimer),
        (status = 400, description = "Invalid answers or password"),
        (status = 404, description = "Disclaimer not found")
    ),
    tag = "studioadmin"
)]
pub async fn update_disclaimer(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateDisclaimerRequest>,
) -> Result<Json<OnlineDisclaimer>, ApiError> {
    request.validate()?;
    let updated = state
        .disclaimer_service
        .update(staff.user_id, id, request, Utc::now())
        .await?;
    Ok(Json(updated))
}

/// Delete an online disclaimer, archiving it while inside the retention period
#[utoipa::path(
    delete,
    path = "/api/studioadmin/disclaimers/{id}",
    params(("id" = i32, Path, description = "Online disclaimer id")),
    responses(
        (status = 200, description = "Disclaimer deleted", body = DeleteDisclaimerResponse),
        (status = 404, description = "Disclaimer not found")
    ),
    tag = "studioadmin"
)]
pub async fn delete_disclaimer(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
    Path(id): Path<i32>,
) -> Result<Json<DeleteDisclaimerResponse>, ApiError> {
    Ok(Json(state.disclaimer_service.delete_online(id, Utc::now()).await?))
}

/// Delete a non-registered disclaimer, archiving it while inside the retention period
#[utoipa::path(
    delete,
    path = "/api/studioadmin/non-registered-disclaimers/{id}",
    params(("id" = i32, Path, description = "Non-registered disclaimer id")),
    responses(
        (status = 200, description = "Disclaimer deleted", body = DeleteDisclaimerResponse),
        (status = 404, description = "Disclaimer not found")
    ),
    tag = "studioadmin"
)]
pub async fn delete_non_registered_disclaimer(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
    Path(id): Path<i32>,
) -> Result<Json<DeleteDisclaimerResponse>, ApiError> {
    Ok(Json(
        state
            .disclaimer_service
            .delete_non_registered(id, Utc::now())
            .await?,
    ))
}

/// Record a paper disclaimer for a user (staff)
#[utoipa::path(
    post,
    path = "/api/studioadmin/print-disclaimers",
    request_body = PrintDisclaimerRequest,
    responses(
        (status = 201, description = "Paper disclaimer recorded", body = PrintDisclaimer),
        (status = 400, description = "Paper disclaimer already recorded")
    ),
    tag = "studioadmin"
)]
pub async fn record_print_disclaimer(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
    Json(request): Json<PrintDisclaimerRequest>,
) -> Result<(StatusCode, Json<PrintDisclaimer>), ApiError> {
    let created = state
        .disclaimer_service
        .record_print(request.user_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Archived disclaimer snapshots (staff)
#[utoipa::path(
    get,
    path = "/api/studioadmin/archived-disclaimers",
    responses((status = 200, description = "Archived disclaimers", body = Vec<ArchivedDisclaimer>)),
    tag = "studioadmin"
)]
pub async fn list_archived_disclaimers(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
) -> Result<Json<Vec<ArchivedDisclaimer>>, ApiError> {
    Ok(Json(state.disclaimer_service.list_archived().await?))
}
