use axum::{
    extract::{Multipart, State},
    Json,
};

use crate::auth::extract::AuthedUser;
use crate::errors::AppError;
use crate::models::profile::{validate_username, Profile, ProfileUpdate};
use crate::profile::repository::RepoError;
use crate::state::AppState;
use crate::storage::upload::{avatar_path, read_image};

const MAX_BIO_LEN: usize = 500;
const MAX_FIELD_LEN: usize = 120;

/// PATCH /api/v1/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    user: AuthedUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>, AppError> {
    let update = normalize_update(update)?;
    let profile = match state
        .profiles
        .update_details(user.identity.id, &update)
        .await
    {
        Ok(profile) => profile,
        Err(RepoError::Conflict(_)) => {
            return Err(AppError::Conflict("Username is already taken".to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    state.sessions.refresh_identity(user.identity.id).await;
    Ok(Json(profile))
}

/// POST /api/v1/profile/avatar
pub async fn handle_upload_avatar(
    State(state): State<AppState>,
    user: AuthedUser,
    multipart: Multipart,
) -> Result<Json<Profile>, AppError> {
    let image = read_image(multipart).await?;
    let path = avatar_path(user.identity.id, image.extension);
    state
        .media
        .upload(&path, image.body, &image.content_type)
        .await?;

    let url = state.media.public_url(&path);
    let profile = state.profiles.set_avatar(user.identity.id, &url).await?;
    state.sessions.refresh_identity(user.identity.id).await;
    Ok(Json(profile))
}

/// Trims every field. A blank username or name means "unchanged", a blank
/// contact field clears it.
fn normalize_update(update: ProfileUpdate) -> Result<ProfileUpdate, AppError> {
    let trim = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let update = ProfileUpdate {
        username: trim(update.username),
        name: trim(update.name),
        phone: update.phone.trimmed(),
        location: update.location.trimmed(),
        bio: update.bio.trimmed(),
    };

    if let Some(username) = &update.username {
        validate_username(username).map_err(AppError::Validation)?;
    }
    for (field, value, max) in [
        ("name", update.name.as_deref(), MAX_FIELD_LEN),
        ("phone", update.phone.as_deref(), MAX_FIELD_LEN),
        ("location", update.location.as_deref(), MAX_FIELD_LEN),
        ("bio", update.bio.as_deref(), MAX_BIO_LEN),
    ] {
        if value.is_some_and(|v| v.chars().count() > max) {
            return Err(AppError::Validation(format!(
                "{field} must be at most {max} characters"
            )));
        }
    }
    Ok(update)
}
