// HTTP handlers for versioned content endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use validator::Validate;

use crate::auth::StaffUser;
use crate::content::models::{
    CreateDisclaimerContentRequest, CreatePolicyRequest, CurrentVersionResponse, DisclaimerContent,
    PolicyDocument, PolicyKind, UpdateDisclaimerContentRequest,
};
use crate::error::ApiError;
use crate::AppState;

fn parse_version(raw: &str) -> Result<Decimal, ApiError> {
    Decimal::from_str(raw).map_err(|_| ApiError::RuleViolation(format!("Invalid version {}", raw)))
}

/// Current published disclaimer content
#[utoipa::path(
    get,
    path = "/api/content/disclaimer/current",
    responses(
        (status = 200, description = "Current disclaimer content", body = DisclaimerContent),
        (status = 404, description = "No published disclaimer content")
    ),
    tag = "content"
)]
pub async fn get_current_disclaimer_content(
    State(state): State<AppState>,
) -> Result<Json<DisclaimerContent>, ApiError> {
    let content = state
        .content_service
        .current_disclaimer_content()
        .await?
        .ok_or_else(|| ApiError::not_found("Disclaimer content", "current"))?;
    Ok(Json(content))
}

/// Current published disclaimer version number (0 when none)
#[utoipa::path(
    get,
    path = "/api/content/disclaimer/current/version",
    responses((status = 200, description = "Current version", body = CurrentVersionResponse)),
    tag = "content"
)]
pub async fn get_current_disclaimer_version(
    State(state): State<AppState>,
) -> Result<Json<CurrentVersionResponse>, ApiError> {
    let version = state.content_service.current_disclaimer_version().await?;
    Ok(Json(CurrentVersionResponse { version }))
}

/// All disclaimer content versions, drafts included
#[utoipa::path(
    get,
    path = "/api/content/disclaimer",
    responses((status = 200, description = "All versions", body = Vec<DisclaimerContent>)),
    tag = "content"
)]
pub async fn list_disclaimer_content(
    State(state): State<AppState>,
) -> Result<Json<Vec<DisclaimerContent>>, ApiError> {
    Ok(Json(state.content_service.list_disclaimer_content().await?))
}

/// Create a disclaimer content version (staff only)
#[utoipa::path(
    post,
    path = "/api/content/disclaimer",
    request_body = CreateDisclaimerContentRequest,
    responses(
        (status = 201, description = "Version created", body = DisclaimerContent),
        (status = 400, description = "Version not incremented or content unchanged"),
        (status = 403, description = "Staff only")
    ),
    tag = "content"
)]
pub async fn create_disclaimer_content(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Json(request): Json<CreateDisclaimerContentRequest>,
) -> Result<(StatusCode, Json<DisclaimerContent>), ApiError> {
    request.validate()?;
    tracing::debug!("Staff user {} creating disclaimer content", staff.user_id);
    let created = state.content_service.create_disclaimer_content(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Edit or publish a draft disclaimer content version (staff only)
#[utoipa::path(
    put,
    path = "/api/content/disclaimer/{version}",
    params(("version" = String, Path, description = "Content version, e.g. 2.0")),
    request_body = UpdateDisclaimerContentRequest,
    responses(
        (status = 200, description = "Version updated", body = DisclaimerContent),
        (status = 404, description = "Version not found"),
        (status = 409, description = "Version already published")
    ),
    tag = "content"
)]
pub async fn update_disclaimer_content(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
    Path(version): Path<String>,
    Json(request): Json<UpdateDisclaimerContentRequest>,
) -> Result<Json<DisclaimerContent>, ApiError> {
    request.validate()?;
    let version = parse_version(&version)?;
    let updated = state
        .content_service
        .update_disclaimer_content(version, request)
        .await?;
    Ok(Json(updated))
}

async fn current_policy(state: &AppState, kind: PolicyKind) -> Result<Json<PolicyDocument>, ApiError> {
    let policy = state
        .content_service
        .current_policy(kind)
        .await?
        .ok_or_else(|| ApiError::not_found(&kind.to_string(), "current"))?;
    Ok(Json(policy))
}

async fn create_policy(
    state: &AppState,
    kind: PolicyKind,
    request: CreatePolicyRequest,
) -> Result<(StatusCode, Json<PolicyDocument>), ApiError> {
    request.validate()?;
    let created = state.content_service.create_policy(kind, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Current data privacy policy
#[utoipa::path(
    get,
    path = "/api/content/privacy",
    responses(
        (status = 200, description = "Current policy", body = PolicyDocument),
        (status = 404, description = "No policy issued")
    ),
    tag = "content"
)]
pub async fn get_privacy_policy(State(state): State<AppState>) -> Result<Json<PolicyDocument>, ApiError> {
    current_policy(&state, PolicyKind::DataPrivacy).await
}

/// Issue a new data privacy policy version (staff only)
#[utoipa::path(
    post,
    path = "/api/content/privacy",
    request_body = CreatePolicyRequest,
    responses((status = 201, description = "Policy created", body = PolicyDocument)),
    tag = "content"
)]
pub async fn create_privacy_policy(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
    Json(request): Json<CreatePolicyRequest>,
) -> Result<(StatusCode, Json<PolicyDocument>), ApiError> {
    create_policy(&state, PolicyKind::DataPrivacy, request).await
}

/// Current cookie policy
#[utoipa::path(
    get,
    path = "/api/content/cookie",
    responses(
        (status = 200, description = "Current policy", body = PolicyDocument),
        (status = 404, description = "No policy issued")
    ),
    tag = "content"
)]
pub async fn get_cookie_policy(State(state): State<AppState>) -> Result<Json<PolicyDocument>, ApiError> {
    current_policy(&state, PolicyKind::Cookie).await
}

/// Issue a new cookie policy version (staff only)
#[utoipa::path(
    post,
    path = "/api/content/cookie",
    request_body = CreatePolicyRequest,
    responses((status = 201, description = "Policy created", body = PolicyDocument)),
    tag = "content"
)]
pub async fn create_cookie_policy(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
    Json(request): Json<CreatePolicyRequest>,
) -> Result<(StatusCode, Json<PolicyDocument>), ApiError> {
    create_policy(&state, PolicyKind::Cookie, request).await
}
