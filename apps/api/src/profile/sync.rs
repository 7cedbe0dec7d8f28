//! Profile Synchronizer: fetch-or-create of the profile row behind an identity.
//!
//! Never returns an error. Anything unexpected from the data collaborator is
//! logged and surfaces as `ProfileState::Unset`, which the rest of the API
//! treats like a signed-out caller.

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::Identity;
use crate::models::profile::{disambiguate_username, NewProfile, ProfileState};
use crate::profile::repository::{ProfileRepository, RepoError};

#[derive(Clone)]
pub struct ProfileSynchronizer {
    repo: Arc<dyn ProfileRepository>,
}

impl ProfileSynchronizer {
    pub fn new(repo: Arc<dyn ProfileRepository>) -> Self {
        Self { repo }
    }

    pub async fn fetch_profile(&self, identity: &Identity) -> ProfileState {
        match self.repo.get(identity.id).await {
            Ok(profile) => ProfileState::Loaded(profile),
            Err(RepoError::NotFound) => self.create_default(identity).await,
            Err(e) => {
                warn!("Failed to fetch profile for {}: {e}", identity.id);
                ProfileState::Unset
            }
        }
    }

    async fn create_default(&self, identity: &Identity) -> ProfileState {
        let new_profile = NewProfile::for_identity(identity);
        match self.repo.insert(&new_profile).await {
            Ok(profile) => {
                info!(
                    "Created default profile '{}' for {}",
                    profile.username, identity.id
                );
                ProfileState::Loaded(profile)
            }
            Err(RepoError::Conflict(constraint)) => {
                info!(
                    "Profile insert for {} hit {constraint}, resolving",
                    identity.id
                );
                self.resolve_conflict(new_profile).await
            }
            Err(e) => {
                warn!("Failed to create profile for {}: {e}", identity.id);
                ProfileState::Unset
            }
        }
    }

    /// Either another request created this identity's row first (adopt it),
    /// or the username is taken by someone else (retry once with a suffix).
    async fn resolve_conflict(&self, new_profile: NewProfile) -> ProfileState {
        let id = new_profile.id;
        match self.repo.get(id).await {
            Ok(profile) => return ProfileState::Loaded(profile),
            Err(RepoError::NotFound) => {}
            Err(e) => {
                warn!("Failed to re-read profile for {id}: {e}");
                return ProfileState::Unset;
            }
        }

        let retry = NewProfile {
            username: disambiguate_username(&new_profile.username, id),
            ..new_profile
        };
        match self.repo.insert(&retry).await {
            Ok(profile) => {
                info!(
                    "Created default profile '{}' for {id} after username collision",
                    profile.username
                );
                ProfileState::Loaded(profile)
            }
            Err(RepoError::Conflict(_)) => match self.repo.get(id).await {
                Ok(profile) => ProfileState::Loaded(profile),
                Err(e) => {
                    warn!("Profile creation for {id} conflicted twice: {e}");
                    ProfileState::Unset
                }
            },
            Err(e) => {
                warn!("Failed to create profile for {id} on retry: {e}");
                ProfileState::Unset
            }
        }
    }
}
