//! Paywall Boundary: decides what a caller sees for a gated feature.

use serde::Serialize;

use crate::access::policy::{can_access, upgrade_options, Feature};
use crate::models::profile::Tier;
use crate::session::SessionSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaywallView {
    /// The session has not resolved yet.
    Loading { feature: Feature },
    Locked {
        feature: Feature,
        required_tier: Tier,
        current_tier: Option<Tier>,
        upgrade_options: Vec<Tier>,
    },
    Allowed { feature: Feature },
}

pub fn evaluate(snapshot: &SessionSnapshot, feature: Feature) -> PaywallView {
    if !snapshot.auth_checked {
        return PaywallView::Loading { feature };
    }

    match snapshot.profile.tier() {
        Some(tier) if can_access(tier, feature) => PaywallView::Allowed { feature },
        current_tier => PaywallView::Locked {
            feature,
            required_tier: feature.min_tier(),
            current_tier,
            upgrade_options: upgrade_options(current_tier, feature),
        },
    }
}
