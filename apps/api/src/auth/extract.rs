use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::profile::{Profile, ProfileState};
use crate::state::AppState;

/// Raw access token from `Authorization: Bearer <token>`.
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer)
            .map(|token| BearerToken(token.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}

/// A caller with a resolved identity and a loaded profile. A session whose
/// profile could not be loaded is treated as signed out; one that has not
/// resolved yet is rejected as retryable.
pub struct AuthedUser {
    pub token: String,
    pub identity: Identity,
    pub profile: Profile,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let snapshot = state.sessions.resolve(&token).await;
        if !snapshot.auth_checked {
            return Err(AppError::SessionPending);
        }
        match (snapshot.identity, snapshot.profile) {
            (Some(identity), ProfileState::Loaded(profile)) => Ok(AuthedUser {
                token,
                identity,
                profile,
            }),
            _ => Err(AppError::Unauthorized),
        }
    }
}

pub struct AdminUser(pub AuthedUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthedUser::from_request_parts(parts, state).await?;
        if !user.profile.is_admin {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
