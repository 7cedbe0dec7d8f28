use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use crate::auth::extract::AuthedUser;
use crate::errors::AppError;
use crate::models::profile::Tier;
use crate::session::SessionSnapshot;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    pub tier: Tier,
    pub payment_reference: String,
}

/// POST /api/v1/subscription/upgrade
pub async fn handle_upgrade(
    State(state): State<AppState>,
    user: AuthedUser,
    Json(req): Json<UpgradeRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    check_upgrade(user.profile.tier, &req)?;
    change_tier(&state, &user, req.tier).await
}

/// POST /api/v1/subscription/cancel
/// Drops back to the free tier.
pub async fn handle_cancel(
    State(state): State<AppState>,
    user: AuthedUser,
) -> Result<Json<SessionSnapshot>, AppError> {
    if user.profile.tier == Tier::Free {
        return Err(AppError::Validation("No active subscription".to_string()));
    }
    change_tier(&state, &user, Tier::Free).await
}

async fn change_tier(
    state: &AppState,
    user: &AuthedUser,
    tier: Tier,
) -> Result<Json<SessionSnapshot>, AppError> {
    state.profiles.set_tier(user.identity.id, tier).await?;
    info!(
        "User {} changed tier {} -> {}",
        user.identity.id, user.profile.tier, tier
    );
    state.sessions.refresh_identity(user.identity.id).await;
    Ok(Json(state.sessions.resolve(&user.token).await))
}

fn check_upgrade(current: Tier, req: &UpgradeRequest) -> Result<(), AppError> {
    if req.payment_reference.trim().is_empty() {
        return Err(AppError::Validation(
            "payment_reference is required".to_string(),
        ));
    }
    if req.tier <= current {
        return Err(AppError::Validation(format!(
            "Cannot upgrade from {current} to {}",
            req.tier
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade(tier: Tier, reference: &str) -> UpgradeRequest {
        UpgradeRequest {
            tier,
            payment_reference: reference.to_string(),
        }
    }

    #[test]
    fn test_upgrade_must_go_up() {
        assert!(check_upgrade(Tier::Free, &upgrade(Tier::Gold, "pay_1")).is_ok());
        assert!(check_upgrade(Tier::Premium, &upgrade(Tier::Premium, "pay_1")).is_err());
        assert!(check_upgrade(Tier::Gold, &upgrade(Tier::Premium, "pay_1")).is_err());
    }

    #[test]
    fn test_upgrade_requires_payment_reference() {
        assert!(check_upgrade(Tier::Free, &upgrade(Tier::Premium, "  ")).is_err());
    }
}
