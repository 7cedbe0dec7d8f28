use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::patch::Patch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub category: Option<String>,
    pub location: Option<String>,
    pub media_path: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateListingRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub category: Option<String>,
    pub location: Option<String>,
}

/// Insert payload, built from a validated request.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub category: Option<String>,
    pub location: Option<String>,
}

/// Partial edit. Absent fields are left unchanged; `category` and `location`
/// are cleared by `null` or a blank string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub category: Patch<String>,
    #[serde(default)]
    pub location: Patch<String>,
    pub is_active: Option<bool>,
}

/// Listing as returned to clients, with the media path resolved to a public URL.
#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    #[serde(flatten)]
    pub listing: Listing,
    pub media_url: Option<String>,
}
