use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::extract::BearerToken;
use crate::auth::{AuthSession, Identity, SignUpOutcome};
use crate::errors::AppError;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub session: Option<AuthSession>,
    pub identity: Identity,
    pub confirmation_required: bool,
}

/// POST /api/v1/auth/signup
pub async fn handle_signup(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), AppError> {
    validate_credentials(&req)?;
    match state.auth.sign_up(req.email.trim(), &req.password).await? {
        SignUpOutcome::Session(session) => {
            state.sessions.open(&session.access_token).await;
            Ok((
                StatusCode::CREATED,
                Json(SignUpResponse {
                    identity: session.identity.clone(),
                    session: Some(session),
                    confirmation_required: false,
                }),
            ))
        }
        SignUpOutcome::ConfirmationRequired(identity) => Ok((
            StatusCode::ACCEPTED,
            Json(SignUpResponse {
                session: None,
                identity,
                confirmation_required: true,
            }),
        )),
    }
}

/// POST /api/v1/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<AuthSession>, AppError> {
    validate_credentials(&req)?;
    let session = state
        .auth
        .sign_in_with_password(req.email.trim(), &req.password)
        .await?;
    // Start the session pipeline now so the profile is warm by the next call.
    state.sessions.open(&session.access_token).await;
    Ok(Json(session))
}

/// POST /api/v1/auth/logout
pub async fn handle_logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<StatusCode, AppError> {
    if let Err(e) = state.auth.sign_out(&token).await {
        warn!("Remote sign-out failed, dropping local session anyway: {e}");
    }
    state.sessions.close(&token).await;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/refresh
pub async fn handle_refresh(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthSession>, AppError> {
    let session = state
        .auth
        .refresh_session(&token, &req.refresh_token)
        .await?;
    state.sessions.rekey(&token, &session.access_token).await;
    Ok(Json(session))
}

fn validate_credentials(req: &CredentialsRequest) -> Result<(), AppError> {
    let email = req.email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(AppError::Validation("A valid email address is required".to_string()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(email: &str, password: &str) -> CredentialsRequest {
        CredentialsRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials(&creds("jane@example.com", "secret1")).is_ok());
        assert!(validate_credentials(&creds(" jane@example.com ", "secret1")).is_ok());
        assert!(validate_credentials(&creds("jane", "secret1")).is_err());
        assert!(validate_credentials(&creds("@example.com", "secret1")).is_err());
        assert!(validate_credentials(&creds("jane@localhost", "secret1")).is_err());
        assert!(validate_credentials(&creds("jane@example.com", "short")).is_err());
    }
}
