//! Admin panel. Every handler requires `profiles.is_admin`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::extract::AdminUser;
use crate::errors::AppError;
use crate::listings::handlers::to_view;
use crate::models::listing::ListingView;
use crate::models::profile::{Profile, Tier};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    fn bounds(&self) -> (i64, i64) {
        (
            self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            self.offset.unwrap_or(0).max(0),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminUserUpdate {
    pub tier: Option<Tier>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TierCount {
    pub tier: Tier,
    pub users: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub users_by_tier: Vec<TierCount>,
    pub total_users: i64,
    pub total_listings: i64,
}

/// GET /api/v1/admin/users
pub async fn handle_list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Profile>>, AppError> {
    let (limit, offset) = page.bounds();
    Ok(Json(state.profiles.list(limit, offset).await?))
}

/// PATCH /api/v1/admin/users/:id
pub async fn handle_update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(update): Json<AdminUserUpdate>,
) -> Result<Json<Profile>, AppError> {
    if update.tier.is_none() && update.is_admin.is_none() {
        return Err(AppError::Validation("Nothing to update".to_string()));
    }
    if id == admin.identity.id && update.is_admin == Some(false) {
        return Err(AppError::Validation(
            "Admins cannot revoke their own admin flag".to_string(),
        ));
    }

    let mut profile = state.profiles.get(id).await?;
    if let Some(tier) = update.tier {
        profile = state.profiles.set_tier(id, tier).await?;
    }
    if let Some(is_admin) = update.is_admin {
        profile = state.profiles.set_admin(id, is_admin).await?;
    }

    info!(
        "Admin {} set user {id} to tier={} admin={}",
        admin.identity.id, profile.tier, profile.is_admin
    );
    state.sessions.refresh_identity(id).await;
    Ok(Json(profile))
}

/// GET /api/v1/admin/listings
pub async fn handle_list_listings(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<ListingView>>, AppError> {
    let (limit, offset) = page.bounds();
    let listings = state.listings.list_all(limit, offset).await?;
    Ok(Json(
        listings
            .into_iter()
            .map(|l| to_view(state.media.as_ref(), l))
            .collect(),
    ))
}

/// DELETE /api/v1/admin/listings/:id
pub async fn handle_delete_listing(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.listings.delete(id).await?;
    info!("Admin {} removed listing {id}", admin.identity.id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/stats
pub async fn handle_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<AdminStats>, AppError> {
    let counts = state.profiles.count_by_tier().await?;
    let users_by_tier: Vec<TierCount> = Tier::ALL
        .into_iter()
        .map(|tier| TierCount {
            tier,
            users: counts
                .iter()
                .find(|(t, _)| *t == tier)
                .map_or(0, |(_, n)| *n),
        })
        .collect();
    Ok(Json(AdminStats {
        total_users: users_by_tier.iter().map(|c| c.users).sum(),
        users_by_tier,
        total_listings: state.listings.count().await?,
    }))
}
