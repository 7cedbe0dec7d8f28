use std::sync::Arc;

use crate::access::QuotaConfig;
use crate::auth::AuthProvider;
use crate::listings::ListingRepository;
use crate::profile::ProfileRepository;
use crate::session::SessionHub;
use crate::storage::MediaStore;

/// Shared application state injected into all route handlers via Axum extractors.
/// Every collaborator is a trait object so tests can swap in in-memory fakes.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub listings: Arc<dyn ListingRepository>,
    pub media: Arc<dyn MediaStore>,
    /// Per-access-token session pipelines (identity → profile).
    pub sessions: Arc<SessionHub>,
    /// The single quota table for listings and the explore feed.
    pub quotas: QuotaConfig,
}
