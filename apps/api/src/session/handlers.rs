use axum::{extract::State, Json};

use crate::auth::extract::BearerToken;
use crate::errors::AppError;
use crate::session::SessionSnapshot;
use crate::state::AppState;

/// GET /api/v1/me
pub async fn handle_get_me(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.sessions.resolve(&token).await))
}

/// POST /api/v1/me/refresh
pub async fn handle_refresh_me(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.sessions.refresh_profile(&token).await))
}
