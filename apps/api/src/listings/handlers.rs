use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::access::quota::{Quota, QuotaKind};
use crate::auth::extract::AuthedUser;
use crate::errors::AppError;
use crate::listings::validation::{validate_listing_update, validate_new_listing};
use crate::models::listing::{CreateListingRequest, Listing, ListingUpdate, ListingView};
use crate::profile::repository::RepoError;
use crate::state::AppState;
use crate::storage::upload::{listing_media_path, read_image};
use crate::storage::MediaStore;

#[derive(Debug, Serialize)]
pub struct MyListingsResponse {
    pub listings: Vec<ListingView>,
    pub used: usize,
    pub quota: Quota,
}

pub fn to_view(media: &dyn MediaStore, listing: Listing) -> ListingView {
    let media_url = listing.media_path.as_deref().map(|p| media.public_url(p));
    ListingView { listing, media_url }
}

fn to_views(media: &dyn MediaStore, listings: Vec<Listing>) -> Vec<ListingView> {
    listings.into_iter().map(|l| to_view(media, l)).collect()
}

/// GET /api/v1/listings
/// Explore feed: newest active listings, capped by the caller's tier.
pub async fn handle_explore(
    State(state): State<AppState>,
    user: AuthedUser,
) -> Result<Json<Vec<ListingView>>, AppError> {
    let quota = state
        .quotas
        .quota_for(user.profile.tier, QuotaKind::ExploreFeed);
    let listings = state.listings.list_recent(quota.limit()).await?;
    Ok(Json(to_views(state.media.as_ref(), listings)))
}

/// GET /api/v1/listings/mine
pub async fn handle_my_listings(
    State(state): State<AppState>,
    user: AuthedUser,
) -> Result<Json<MyListingsResponse>, AppError> {
    let listings = state.listings.list_by_owner(user.identity.id).await?;
    Ok(Json(MyListingsResponse {
        used: listings.len(),
        quota: state.quotas.quota_for(user.profile.tier, QuotaKind::Listings),
        listings: to_views(state.media.as_ref(), listings),
    }))
}

/// POST /api/v1/listings
pub async fn handle_create_listing(
    State(state): State<AppState>,
    user: AuthedUser,
    Json(req): Json<CreateListingRequest>,
) -> Result<(StatusCode, Json<ListingView>), AppError> {
    let new_listing = validate_new_listing(user.identity.id, req)?;
    let tier = user.profile.tier;
    let quota = state.quotas.quota_for(tier, QuotaKind::Listings);

    let listing = match state.listings.create(&new_listing, quota.limit()).await {
        Ok(listing) => listing,
        Err(RepoError::LimitReached) => {
            return Err(AppError::QuotaExceeded {
                tier,
                limit: quota.limit().unwrap_or(u32::MAX),
            })
        }
        Err(e) => return Err(e.into()),
    };

    info!("User {} created listing {}", user.identity.id, listing.id);
    Ok((
        StatusCode::CREATED,
        Json(to_view(state.media.as_ref(), listing)),
    ))
}

/// GET /api/v1/listings/:id
pub async fn handle_get_listing(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ListingView>, AppError> {
    let listing = find_listing(&state, id).await?;
    let visible = listing.is_active || listing.owner_id == user.identity.id || user.profile.is_admin;
    if !visible {
        return Err(AppError::NotFound(format!("Listing {id} not found")));
    }
    Ok(Json(to_view(state.media.as_ref(), listing)))
}

/// PATCH /api/v1/listings/:id
pub async fn handle_update_listing(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<Uuid>,
    Json(update): Json<ListingUpdate>,
) -> Result<Json<ListingView>, AppError> {
    let update = validate_listing_update(update)?;
    let listing = find_listing(&state, id).await?;
    if listing.owner_id != user.identity.id {
        return Err(AppError::Forbidden);
    }
    let listing = state.listings.update(id, &update).await?;
    Ok(Json(to_view(state.media.as_ref(), listing)))
}

/// DELETE /api/v1/listings/:id
pub async fn handle_delete_listing(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let listing = find_listing(&state, id).await?;
    if listing.owner_id != user.identity.id && !user.profile.is_admin {
        return Err(AppError::Forbidden);
    }
    state.listings.delete(id).await?;
    info!("User {} deleted listing {id}", user.identity.id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/listings/:id/media
pub async fn handle_upload_listing_media(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ListingView>, AppError> {
    let listing = find_listing(&state, id).await?;
    if listing.owner_id != user.identity.id {
        return Err(AppError::Forbidden);
    }

    let image = read_image(multipart).await?;
    let path = listing_media_path(listing.owner_id, id, image.extension);
    state
        .media
        .upload(&path, image.body, &image.content_type)
        .await?;
    let listing = state.listings.set_media(id, &path).await?;
    Ok(Json(to_view(state.media.as_ref(), listing)))
}

async fn find_listing(state: &AppState, id: Uuid) -> Result<Listing, AppError> {
    state.listings.get(id).await.map_err(|e| match e {
        RepoError::NotFound => AppError::NotFound(format!("Listing {id} not found")),
        other => other.into(),
    })
}
