// HTTP handlers for authentication endpoints

use axum::{extract::State, Json};
use validator::Validate;

use crate::auth::middleware::AuthenticatedUser;
use crate::auth::models::{AuthResponse, LoginRequest, UpdateProfileRequest, UserResponse};
use crate::error::ApiError;
use crate::AppState;

/// Login with username and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid username or password")
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    request.validate()?;
    let response = state
        .auth_service
        .login(&request.username, &request.password)
        .await?;
    Ok(Json(response))
}

/// Update the signed-in user's names and email
///
/// The change is saved first; the mailing-list provider is then told about it.
/// A provider failure is logged and does not fail the request.
#[utoipa::path(
    put,
    path = "/api/account/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Invalid names or email"),
        (status = 401, description = "Not signed in"),
        (status = 409, description = "Email already registered to another user")
    ),
    tag = "auth"
)]
pub async fn update_profile_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    request.validate()?;
    let (before, after) = state
        .auth_service
        .update_profile(user.user_id, request)
        .await?;
    state.mailing_list_service.profile_changed(&before, &after).await;
    Ok(Json(after.into()))
}
