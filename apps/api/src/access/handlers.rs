use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::access::paywall::{evaluate, PaywallView};
use crate::access::policy::{features_for, Feature};
use crate::access::quota::{Quota, QuotaKind};
use crate::auth::extract::BearerToken;
use crate::errors::AppError;
use crate::models::profile::Tier;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub tier: Tier,
    pub listing_quota: Quota,
    pub explore_feed_quota: Quota,
    pub features: Vec<Feature>,
}

/// GET /api/v1/features/:feature
pub async fn handle_check_feature(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(feature): Path<String>,
) -> Result<Json<PaywallView>, AppError> {
    let feature: Feature = feature.parse().map_err(AppError::NotFound)?;
    let snapshot = state.sessions.resolve(&token).await;
    Ok(Json(evaluate(&snapshot, feature)))
}

/// GET /api/v1/plans
pub async fn handle_list_plans(State(state): State<AppState>) -> Json<Vec<PlanResponse>> {
    Json(
        Tier::ALL
            .into_iter()
            .map(|tier| PlanResponse {
                tier,
                listing_quota: state.quotas.quota_for(tier, QuotaKind::Listings),
                explore_feed_quota: state.quotas.quota_for(tier, QuotaKind::ExploreFeed),
                features: features_for(tier),
            })
            .collect(),
    )
}
