// Studio bookings API
// Disclaimers with versioned terms, vouchers, class blocks and the mailing list

pub mod activity_log;
pub mod auth;
pub mod blocks;
pub mod cache;
pub mod commands;
pub mod config;
pub mod content;
pub mod db;
pub mod disclaimers;
pub mod encryption;
pub mod error;
pub mod mailer;
pub mod mailing_list;
pub mod validation;
pub mod vouchers;

#[cfg(test)]
pub mod memory;


use axum::{
    extract::FromRef,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use activity_log::{ActivityLogger, PgActivityLogRepository};
use auth::{AuthService, PgUserRepository, TokenService};
use blocks::{BlockService, PgBlockRepository};
use cache::{NoopStatusCache, RedisStatusCache, StatusCache};
use config::AppConfig;
use content::{ContentService, PgContentRepository};
use disclaimers::{DisclaimerService, PgDisclaimerRepository};
use mailing_list::{
    MailchimpClient, MailingListClient, MailingListError, MailingListService, PgGroupRepository,
};
use vouchers::{PgVoucherRepository, VoucherService};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        auth::handlers::login_handler,
        auth::handlers::update_profile_handler,
        content::handlers::get_current_disclaimer_content,
        content::handlers::get_current_disclaimer_version,
        content::handlers::list_disclaimer_content,
        content::handlers::create_disclaimer_content,
        content::handlers::update_disclaimer_content,
        content::handlers::get_privacy_policy,
        content::handlers::create_privacy_policy,
        content::handlers::get_cookie_policy,
        content::handlers::create_cookie_policy,
        disclaimers::handlers::sign_disclaimer,
        disclaimers::handlers::my_disclaimer_status,
        disclaimers::handlers::create_non_registered_disclaimer,
        disclaimers::handlers::update_disclaimer,
        disclaimers::handlers::delete_disclaimer,
        disclaimers::handlers::delete_non_registered_disclaimer,
        disclaimers::handlers::record_print_disclaimer,
        disclaimers::handlers::list_archived_disclaimers,
        vouchers::handlers::quote_voucher,
        vouchers::handlers::create_voucher,
        vouchers::handlers::redeem_voucher,
        blocks::handlers::allocate_block,
        blocks::handlers::assign_block,
        blocks::handlers::cancel_booking,
        mailing_list::handlers::list_subscribers,
        mailing_list::handlers::subscribe,
        mailing_list::handlers::unsubscribe,
        mailing_list::handlers::webhook,
    ),
    components(
        schemas(
            auth::models::LoginRequest,
            auth::models::UpdateProfileRequest,
            auth::models::AuthResponse,
            auth::models::UserResponse,
            content::models::DisclaimerContent,
            content::models::DisclaimerTerms,
            content::models::PolicyDocument,
            content::models::CreateDisclaimerContentRequest,
            content::models::UpdateDisclaimerContentRequest,
            content::models::CreatePolicyRequest,
            content::models::CurrentVersionResponse,
            disclaimers::models::DisclaimerDetails,
            disclaimers::models::OnlineDisclaimer,
            disclaimers::models::PrintDisclaimer,
            disclaimers::models::NonRegisteredDisclaimer,
            disclaimers::models::ArchivedDisclaimer,
            disclaimers::models::SignDisclaimerRequest,
            disclaimers::models::UpdateDisclaimerRequest,
            disclaimers::models::NonRegisteredDisclaimerRequest,
            disclaimers::models::PrintDisclaimerRequest,
            disclaimers::models::DisclaimerStatusResponse,
            disclaimers::models::DeleteDisclaimerResponse,
            vouchers::models::VoucherKind,
            vouchers::models::Voucher,
            vouchers::models::UsedVoucher,
            vouchers::models::UnpaidItem,
            vouchers::models::CreateVoucherRequest,
            vouchers::models::RedeemVoucherRequest,
            vouchers::models::DiscountedItem,
            vouchers::models::VoucherQuote,
            vouchers::models::RedemptionResponse,
            blocks::models::EventCategory,
            blocks::models::EventType,
            blocks::models::Event,
            blocks::models::BlockType,
            blocks::models::BookingStatus,
            blocks::models::Booking,
            blocks::models::Block,
            blocks::models::BlockAllocationResponse,
            blocks::models::CancellationResponse,
            mailing_list::models::MailingListMember,
            mailing_list::models::WebhookPayload,
        )
    ),
    tags(
        (name = "auth", description = "Sign in and account profile"),
        (name = "content", description = "Versioned disclaimer terms and policies"),
        (name = "disclaimers", description = "Signing disclaimers and checking status"),
        (name = "studioadmin", description = "Staff disclaimer management"),
        (name = "vouchers", description = "Discount codes for bookings and blocks"),
        (name = "bookings", description = "Block allocation and booking cancellation"),
        (name = "mailing-list", description = "Mailing list subscriptions and provider webhook")
    ),
    info(
        title = "Studio Bookings API",
        version = "1.0.0",
        description = "Disclaimers, vouchers, class blocks and mailing list for a studio booking system"
    )
)]
pub struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub content_service: Arc<ContentService>,
    pub disclaimer_service: Arc<DisclaimerService>,
    pub voucher_service: Arc<VoucherService>,
    pub block_service: Arc<BlockService>,
    pub mailing_list_service: Arc<MailingListService>,
    pub tokens: Arc<TokenService>,
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

/// Status cache for the configured environment; Redis failures fall back to no cache
pub async fn status_cache(config: &AppConfig) -> Arc<dyn StatusCache> {
    let Some(url) = &config.redis_url else {
        tracing::info!("REDIS_URL not set; disclaimer status cache disabled");
        return Arc::new(NoopStatusCache);
    };
    match RedisStatusCache::connect(url).await {
        Ok(cache) => Arc::new(cache) as Arc<dyn StatusCache>,
        Err(e) => {
            tracing::warn!("Redis unavailable ({}); disclaimer status cache disabled", e);
            Arc::new(NoopStatusCache)
        }
    }
}

/// Mailing-list provider client, when credentials are configured
pub fn mailing_list_client(
    config: &AppConfig,
) -> Result<Option<Arc<dyn MailingListClient>>, MailingListError> {
    match &config.mailchimp {
        Some(mailchimp) => {
            let client: Arc<dyn MailingListClient> =
                Arc::new(MailchimpClient::new(mailchimp.clone())?);
            Ok(Some(client))
        }
        None => {
            tracing::info!("Mailchimp not configured; mailing list sync disabled");
            Ok(None)
        }
    }
}

impl AppState {
    /// Wire every service over PostgreSQL
    pub async fn from_config(pool: PgPool, config: &AppConfig) -> Result<Self, MailingListError> {
        let users = Arc::new(PgUserRepository::new(pool.clone()));
        let activity = ActivityLogger::new(Arc::new(PgActivityLogRepository::new(pool.clone())));
        let tokens = Arc::new(TokenService::new(config.jwt_secret.clone()));
        let auth_service = Arc::new(AuthService::new(users.clone(), tokens.clone()));
        let content_service = Arc::new(ContentService::new(
            Arc::new(PgContentRepository::new(pool.clone())),
            activity.clone(),
        ));
        let disclaimer_service = Arc::new(DisclaimerService::new(
            Arc::new(PgDisclaimerRepository::new(pool.clone())),
            content_service.clone(),
            auth_service.clone(),
            status_cache(config).await,
            activity.clone(),
        ));
        let block_repo = Arc::new(PgBlockRepository::new(pool.clone()));
        let block_service = Arc::new(BlockService::new(block_repo.clone(), activity.clone()));
        let voucher_service = Arc::new(VoucherService::new(
            Arc::new(PgVoucherRepository::new(pool.clone())),
            block_repo,
            activity.clone(),
        ));
        let mailing_list_service = Arc::new(MailingListService::new(
            Arc::new(PgGroupRepository::new(pool)),
            users,
            mailing_list_client(config)?,
            config.mailchimp.as_ref().map(|m| m.list_id.clone()),
            activity,
        ));

        Ok(Self {
            auth_service,
            content_service,
            disclaimer_service,
            voucher_service,
            block_service,
            mailing_list_service,
            tokens,
        })
    }
}

/// Creates and configures the application router
pub fn create_router(state: AppState) -> Router {
    use auth::handlers as auth_h;
    use blocks::handlers as blocks_h;
    use content::handlers as content_h;
    use disclaimers::handlers as disclaimers_h;
    use mailing_list::handlers as mailing_h;
    use vouchers::handlers as vouchers_h;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/auth/login", post(auth_h::login_handler))
        .route("/api/account/profile", put(auth_h::update_profile_handler))
        // Content
        .route(
            "/api/content/disclaimer/current",
            get(content_h::get_current_disclaimer_content),
        )
        .route(
            "/api/content/disclaimer/current/version",
            get(content_h::get_current_disclaimer_version),
        )
        .route(
            "/api/content/disclaimer",
            get(content_h::list_disclaimer_content).post(content_h::create_disclaimer_content),
        )
        .route(
            "/api/content/disclaimer/:version",
            put(content_h::update_disclaimer_content),
        )
        .route(
            "/api/content/privacy",
            get(content_h::get_privacy_policy).post(content_h::create_privacy_policy),
        )
        .route(
            "/api/content/cookie",
            get(content_h::get_cookie_policy).post(content_h::create_cookie_policy),
        )
        // Disclaimers
        .route("/api/disclaimers", post(disclaimers_h::sign_disclaimer))
        .route("/api/disclaimers/me/status", get(disclaimers_h::my_disclaimer_status))
        .route(
            "/api/disclaimers/non-registered",
            post(disclaimers_h::create_non_registered_disclaimer),
        )
        .route(
            "/api/studioadmin/disclaimers/:id",
            put(disclaimers_h::update_disclaimer).delete(disclaimers_h::delete_disclaimer),
        )
        .route(
            "/api/studioadmin/non-registered-disclaimers/:id",
            axum::routing::delete(disclaimers_h::delete_non_registered_disclaimer),
        )
        .route(
            "/api/studioadmin/print-disclaimers",
            post(disclaimers_h::record_print_disclaimer),
        )
        .route(
            "/api/studioadmin/archived-disclaimers",
            get(disclaimers_h::list_archived_disclaimers),
        )
        // Vouchers
        .route("/api/vouchers", post(vouchers_h::create_voucher))
        .route("/api/vouchers/:kind/:code/quote", get(vouchers_h::quote_voucher))
        .route("/api/vouchers/:kind/:code/redeem", post(vouchers_h::redeem_voucher))
        // Blocks
        .route("/api/bookings/:id/block", post(blocks_h::allocate_block))
        .route("/api/bookings/:id/block/:block_id", put(blocks_h::assign_block))
        .route("/api/bookings/:id/cancel", post(blocks_h::cancel_booking))
        // Mailing list
        .route("/api/mailing-list", get(mailing_h::list_subscribers))
        .route("/api/mailing-list/subscribe", post(mailing_h::subscribe))
        .route("/api/mailing-list/unsubscribe", post(mailing_h::unsubscribe))
        .route("/api/mailing-list/webhook", post(mailing_h::webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
