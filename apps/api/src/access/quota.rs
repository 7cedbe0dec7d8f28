//! Per-tier quotas. One shared table for the whole service, loaded from
//! configuration.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Serialize, Serializer};

use crate::models::profile::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limited(u32),
    Unlimited,
}

impl Quota {
    /// Whether one more item fits when `used` already exist.
    pub fn allows_another(&self, used: i64) -> bool {
        match self {
            Quota::Limited(limit) => used < i64::from(*limit),
            Quota::Unlimited => true,
        }
    }

    pub fn limit(&self) -> Option<u32> {
        match self {
            Quota::Limited(limit) => Some(*limit),
            Quota::Unlimited => None,
        }
    }
}

/// Serialized as the number, or `null` for unlimited.
impl Serialize for Quota {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.limit().serialize(serializer)
    }
}

impl FromStr for Quota {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unlimited") {
            return Ok(Quota::Unlimited);
        }
        Ok(Quota::Limited(
            s.parse().with_context(|| format!("invalid quota '{s}'"))?,
        ))
    }
}

fn rank(quota: Quota) -> u64 {
    quota.limit().map_or(u64::MAX, u64::from)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Listings,
    ExploreFeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierTable<T> {
    pub free: T,
    pub premium: T,
    pub gold: T,
}

impl<T: Copy> TierTable<T> {
    pub fn get(&self, tier: Tier) -> T {
        match tier {
            Tier::Free => self.free,
            Tier::Premium => self.premium,
            Tier::Gold => self.gold,
        }
    }
}

impl FromStr for TierTable<Quota> {
    type Err = anyhow::Error;

    /// Parses `free,premium,gold`, e.g. `5,20,100` or `10,50,unlimited`.
    fn from_str(s: &str) -> Result<Self> {
        let values: Vec<Quota> = s
            .split(',')
            .map(str::parse::<Quota>)
            .collect::<Result<_>>()?;
        let [free, premium, gold] = values.as_slice() else {
            bail!("expected three comma-separated quotas (free,premium,gold), got '{s}'");
        };
        let (free, premium, gold) = (*free, *premium, *gold);
        if rank(free) > rank(premium) || rank(premium) > rank(gold) {
            bail!("quotas must not shrink as the tier goes up: '{s}'");
        }
        Ok(TierTable {
            free,
            premium,
            gold,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaConfig {
    pub listings: TierTable<Quota>,
    pub explore_feed: TierTable<Quota>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            listings: TierTable {
                free: Quota::Limited(5),
                premium: Quota::Limited(20),
                gold: Quota::Limited(100),
            },
            explore_feed: TierTable {
                free: Quota::Limited(10),
                premium: Quota::Limited(50),
                gold: Quota::Unlimited,
            },
        }
    }
}

impl QuotaConfig {
    pub fn quota_for(&self, tier: Tier, kind: QuotaKind) -> Quota {
        match kind {
            QuotaKind::Listings => self.listings.get(tier),
            QuotaKind::ExploreFeed => self.explore_feed.get(tier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listing_quotas() {
        let quotas = QuotaConfig::default();
        assert_eq!(
            quotas.quota_for(Tier::Free, QuotaKind::Listings),
            Quota::Limited(5)
        );
        assert_eq!(
            quotas.quota_for(Tier::Gold, QuotaKind::Listings),
            Quota::Limited(100)
        );
        assert_eq!(
            quotas.quota_for(Tier::Gold, QuotaKind::ExploreFeed),
            Quota::Unlimited
        );
    }

    #[test]
    fn test_allows_another() {
        assert!(Quota::Limited(5).allows_another(4));
        assert!(!Quota::Limited(5).allows_another(5));
        assert!(Quota::Unlimited.allows_another(i64::MAX));
    }

    #[test]
    fn test_parse_table() {
        let table: TierTable<Quota> = "10, 50, unlimited".parse().unwrap();
        assert_eq!(table.free, Quota::Limited(10));
        assert_eq!(table.premium, Quota::Limited(50));
        assert_eq!(table.gold, Quota::Unlimited);
    }

    #[test]
    fn test_parse_table_rejects_wrong_arity_and_garbage() {
        assert!("5,20".parse::<TierTable<Quota>>().is_err());
        assert!("5,20,100,200".parse::<TierTable<Quota>>().is_err());
        assert!("5,lots,100".parse::<TierTable<Quota>>().is_err());
    }

    #[test]
    fn test_parse_table_rejects_shrinking_quotas() {
        assert!("20,5,100".parse::<TierTable<Quota>>().is_err());
        assert!("5,unlimited,100".parse::<TierTable<Quota>>().is_err());
    }

    #[test]
    fn test_quota_serializes_unlimited_as_null() {
        assert_eq!(serde_json::to_value(Quota::Unlimited).unwrap(), serde_json::Value::Null);
        assert_eq!(serde_json::to_value(Quota::Limited(5)).unwrap(), 5);
    }
}
