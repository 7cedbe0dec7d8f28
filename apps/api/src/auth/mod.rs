//! Auth collaborator seam.
//!
//! Identities, passwords and tokens are owned by the hosted auth service; this
//! module only models what the rest of the API needs from it. `GoTrueClient` is
//! the production implementation, tests use an in-memory fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod extract;
pub mod gotrue;
pub mod handlers;

/// External user reference. Read-only to this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub identity: Identity,
}

/// Result of a sign-up: either a live session, or an identity that still has
/// to confirm its email before it can sign in.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    Session(AuthSession),
    ConfirmationRequired(Identity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Session-change notification. `previous_token` is set on refresh so that
/// listeners keyed on the old token can follow the rotation.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub access_token: String,
    pub previous_token: Option<String>,
    pub identity: Option<Identity>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Auth service rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Auth service unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolves an access token to its identity. `Ok(None)` means the token is
    /// unknown, expired or revoked.
    async fn get_session(&self, access_token: &str) -> Result<Option<Identity>, AuthError>;

    /// Subscribes to future session changes.
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    async fn refresh_session(
        &self,
        previous_token: &str,
        refresh_token: &str,
    ) -> Result<AuthSession, AuthError>;
}
