pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};

use crate::access::handlers as access;
use crate::admin::handlers as admin;
use crate::auth::handlers as auth;
use crate::listings::handlers as listings;
use crate::profile::handlers as profile;
use crate::session::handlers as session;
use crate::state::AppState;
use crate::storage::upload::MAX_IMAGE_BYTES;
use crate::subscription::handlers as subscription;

// Multipart framing on top of the image itself.
const UPLOAD_BODY_LIMIT: usize = MAX_IMAGE_BYTES + 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let uploads = Router::new()
        .route("/api/v1/profile/avatar", post(profile::handle_upload_avatar))
        .route(
            "/api/v1/listings/:id/media",
            post(listings::handle_upload_listing_media),
        )
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT));

    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/v1/auth/signup", post(auth::handle_signup))
        .route("/api/v1/auth/login", post(auth::handle_login))
        .route("/api/v1/auth/logout", post(auth::handle_logout))
        .route("/api/v1/auth/refresh", post(auth::handle_refresh))
        // Session & profile
        .route("/api/v1/me", get(session::handle_get_me))
        .route("/api/v1/me/refresh", post(session::handle_refresh_me))
        .route("/api/v1/profile", patch(profile::handle_update_profile))
        // Paywall & plans
        .route("/api/v1/features/:feature", get(access::handle_check_feature))
        .route("/api/v1/plans", get(access::handle_list_plans))
        .route(
            "/api/v1/subscription/upgrade",
            post(subscription::handle_upgrade),
        )
        .route(
            "/api/v1/subscription/cancel",
            post(subscription::handle_cancel),
        )
        // Listings
        .route(
            "/api/v1/listings",
            get(listings::handle_explore).post(listings::handle_create_listing),
        )
        .route("/api/v1/listings/mine", get(listings::handle_my_listings))
        .route(
            "/api/v1/listings/:id",
            get(listings::handle_get_listing)
                .patch(listings::handle_update_listing)
                .delete(listings::handle_delete_listing),
        )
        // Admin
        .route("/api/v1/admin/users", get(admin::handle_list_users))
        .route("/api/v1/admin/users/:id", patch(admin::handle_update_user))
        .route("/api/v1/admin/listings", get(admin::handle_list_listings))
        .route(
            "/api/v1/admin/listings/:id",
            delete(admin::handle_delete_listing),
        )
        .route("/api/v1/admin/stats", get(admin::handle_stats))
        .merge(uploads)
        .with_state(state)
}
