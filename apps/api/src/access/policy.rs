//! Access Policy: tier-based authorization. Pure, no I/O.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::profile::Tier;

/// Features behind the paywall, each with the lowest tier that unlocks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Browse,
    CreateListing,
    Dashboard,
    Analytics,
    FeaturedListings,
    PrioritySupport,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Browse,
        Feature::CreateListing,
        Feature::Dashboard,
        Feature::Analytics,
        Feature::FeaturedListings,
        Feature::PrioritySupport,
    ];

    pub fn min_tier(&self) -> Tier {
        match self {
            Feature::Browse | Feature::CreateListing => Tier::Free,
            Feature::Dashboard | Feature::Analytics => Tier::Premium,
            Feature::FeaturedListings | Feature::PrioritySupport => Tier::Gold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Browse => "browse",
            Feature::CreateListing => "create_listing",
            Feature::Dashboard => "dashboard",
            Feature::Analytics => "analytics",
            Feature::FeaturedListings => "featured_listings",
            Feature::PrioritySupport => "priority_support",
        }
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Unknown feature '{s}'"))
    }
}

pub fn is_allowed(tier: Tier, min_tier: Tier) -> bool {
    tier >= min_tier
}

pub fn can_access(tier: Tier, feature: Feature) -> bool {
    is_allowed(tier, feature.min_tier())
}

/// Features unlocked at exactly `tier` or below.
pub fn features_for(tier: Tier) -> Vec<Feature> {
    Feature::ALL
        .into_iter()
        .filter(|f| can_access(tier, *f))
        .collect()
}

/// Tiers strictly above `current` that unlock `feature`, cheapest first.
pub fn upgrade_options(current: Option<Tier>, feature: Feature) -> Vec<Tier> {
    Tier::ALL
        .into_iter()
        .filter(|t| can_access(*t, feature))
        .filter(|t| current.map_or(true, |c| *t > c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_premium_feature_allowed_iff_premium_or_gold() {
        for tier in Tier::ALL {
            let expected = matches!(tier, Tier::Premium | Tier::Gold);
            assert_eq!(can_access(tier, Feature::Dashboard), expected, "{tier}");
        }
    }

    #[test]
    fn test_gold_allows_everything() {
        assert!(Feature::ALL.iter().all(|f| can_access(Tier::Gold, *f)));
    }

    #[test]
    fn test_free_is_limited_to_free_features() {
        assert_eq!(
            features_for(Tier::Free),
            vec![Feature::Browse, Feature::CreateListing]
        );
    }

    #[test]
    fn test_is_allowed_is_total_order() {
        for tier in Tier::ALL {
            for min in Tier::ALL {
                assert_eq!(is_allowed(tier, min), tier >= min);
            }
        }
    }

    #[test]
    fn test_upgrade_options() {
        assert_eq!(
            upgrade_options(Some(Tier::Free), Feature::Dashboard),
            vec![Tier::Premium, Tier::Gold]
        );
        assert_eq!(
            upgrade_options(Some(Tier::Premium), Feature::PrioritySupport),
            vec![Tier::Gold]
        );
        assert_eq!(
            upgrade_options(None, Feature::Browse),
            vec![Tier::Free, Tier::Premium, Tier::Gold]
        );
    }

    #[test]
    fn test_feature_round_trips_through_str() {
        for feature in Feature::ALL {
            assert_eq!(feature.as_str().parse::<Feature>().unwrap(), feature);
        }
        assert!("teleport".parse::<Feature>().is_err());
    }
}
