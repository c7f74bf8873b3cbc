// HTTP handlers for the mailing list

use axum::{extract::State, http::StatusCode, Form, Json};

use crate::auth::{AuthenticatedUser, StaffUser};
use crate::error::ApiError;
use crate::mailing_list::models::{MailingListMember, WebhookPayload};
use crate::AppState;

/// List subscribed users (staff)
#[utoipa::path(
    get,
    path = "/api/mailing-list",
    responses(
        (status = 200, description = "Subscribers ordered by name", body = Vec<MailingListMember>),
        (status = 403, description = "Staff only")
    ),
    tag = "mailing-list"
)]
pub async fn list_subscribers(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
) -> Result<Json<Vec<MailingListMember>>, ApiError> {
    let members = state.mailing_list_service.subscribers().await?;
    Ok(Json(members))
}

/// Subscribe the signed-in user
#[utoipa::path(
    post,
    path = "/api/mailing-list/subscribe",
    responses((status = 204, description = "Subscribed")),
    tag = "mailing-list"
)]
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<StatusCode, ApiError> {
    state.mailing_list_service.subscribe(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Unsubscribe the signed-in user
#[utoipa::path(
    post,
    path = "/api/mailing-list/unsubscribe",
    responses((status = 204, description = "Unsubscribed")),
    tag = "mailing-list"
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<StatusCode, ApiError> {
    state.mailing_list_service.unsubscribe(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Provider webhook (form-encoded)
#[utoipa::path(
    post,
    path = "/api/mailing-list/webhook",
    request_body(content = WebhookPayload, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 204, description = "Change applied"),
        (status = 400, description = "Unexpected list, unknown user or email already taken")
    ),
    tag = "mailing-list"
)]
pub async fn webhook(
    State(state): State<AppState>,
    Form(payload): Form<WebhookPayload>,
) -> Result<StatusCode, ApiError> {
    state.mailing_list_service.handle_webhook(payload).await?;
    Ok(StatusCode::NO_CONTENT)
}
