use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Identity;
use crate::models::patch::Patch;

/// Subscription level. Variant order is the authorization order: free < premium < gold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
    Gold,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Premium, Tier::Gold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Gold => "gold",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown tier '{0}'")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            "gold" => Ok(Tier::Gold),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

impl TryFrom<String> for Tier {
    type Error = UnknownTier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Application-level user record. `id` equals the auth identity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub tier: Tier,
    pub is_admin: bool,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile as observed by a session. `Unset` covers "not fetched yet",
/// "signed out" and "fetch failed"; callers must handle it explicitly.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "status", content = "profile", rename_all = "snake_case")]
pub enum ProfileState {
    #[default]
    Unset,
    Loaded(Profile),
}

impl ProfileState {
    pub fn loaded(&self) -> Option<&Profile> {
        match self {
            ProfileState::Loaded(profile) => Some(profile),
            ProfileState::Unset => None,
        }
    }

    pub fn tier(&self) -> Option<Tier> {
        self.loaded().map(|p| p.tier)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ProfileState::Loaded(_))
    }
}

/// Insert payload for a profile row.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub tier: Tier,
    pub is_admin: bool,
}

impl NewProfile {
    /// Default profile synthesized on first sign-in.
    pub fn for_identity(identity: &Identity) -> Self {
        let local_part = identity.email.split('@').next().unwrap_or_default();
        Self {
            id: identity.id,
            username: default_username(&identity.email),
            name: local_part.to_string(),
            tier: Tier::Free,
            is_admin: false,
        }
    }
}

/// Profile edit submitted by the owner. Absent fields are left unchanged; the
/// contact fields are cleared by `null` or a blank string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Patch<String>,
    #[serde(default)]
    pub location: Patch<String>,
    #[serde(default)]
    pub bio: Patch<String>,
}

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;

/// Derives a username from the email local-part, keeping `[a-z0-9_]`.
pub fn default_username(email: &str) -> String {
    let local_part = email.split('@').next().unwrap_or_default();
    let mut username: String = local_part
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .chars()
        .take(USERNAME_MAX_LEN - 7)
        .collect();
    if username.len() < USERNAME_MIN_LEN {
        username = format!("user_{username}").trim_end_matches('_').to_string();
    }
    username
}

/// Suffixes the username with the first six hex digits of the identity id.
pub fn disambiguate_username(base: &str, id: Uuid) -> String {
    let hex = id.simple().to_string();
    format!("{base}_{}", &hex[..6])
}

pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(format!(
            "Username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err("Username may only contain lowercase letters, digits and '_'".to_string());
    }
    Ok(())
}
