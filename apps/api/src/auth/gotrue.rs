//! REST client for the hosted auth service (GoTrue-compatible API).
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AuthError, AuthEvent, AuthEventKind, AuthProvider, AuthSession, Identity, SignUpOutcome};

const EVENT_BUFFER: usize = 256;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserResponse> for Identity {
    fn from(user: UserResponse) -> Self {
        Identity {
            id: user.id,
            email: user.email.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: UserResponse,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            identity: token.user.into(),
        }
    }
}

/// Sign-up returns a full session when email confirmation is disabled and
/// the bare user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(UserResponse),
}

/// The service has used several error shapes over time; accept all of them.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

#[derive(Clone)]
pub struct GoTrueClient {
    client: Client,
    base_url: String,
    anon_key: String,
    events: broadcast::Sender<AuthEvent>,
}

impl GoTrueClient {
    pub fn new(base_url: &str, anon_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Self {
            client,
            base_url: format!("{}/auth/v1", base_url.trim_end_matches('/')),
            anon_key,
            events,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
    }

    fn emit(
        &self,
        kind: AuthEventKind,
        access_token: &str,
        previous_token: Option<&str>,
        identity: Option<Identity>,
    ) {
        // Err only means no store is listening.
        let _ = self.events.send(AuthEvent {
            kind,
            access_token: access_token.to_string(),
            previous_token: previous_token.map(str::to_string),
            identity,
        });
    }
}

#[async_trait]
impl AuthProvider for GoTrueClient {
    async fn get_session(&self, access_token: &str) -> Result<Option<Identity>, AuthError> {
        let mut last_error: Option<AuthError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = std::time::Duration::from_millis(250 * (1 << (attempt - 1)));
                warn!(
                    "Session lookup attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .request(reqwest::Method::GET, "/user")
                .bearer_auth(access_token)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(AuthError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                debug!("Access token rejected by auth service ({status})");
                return Ok(None);
            }
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_error = Some(error_from_response(response).await);
                continue;
            }
            if !status.is_success() {
                return Err(error_from_response(response).await);
            }

            let user: UserResponse = response.json().await?;
            return Ok(Some(user.into()));
        }

        Err(last_error.unwrap_or(AuthError::Unavailable {
            status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            message: format!("gave up after {MAX_RETRIES} attempts"),
        }))
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let response = self
            .request(reqwest::Method::POST, "/token?grant_type=password")
            .json(&PasswordCredentials { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let session: AuthSession = response.json::<TokenResponse>().await?.into();
        info!("Signed in identity {}", session.identity.id);
        self.emit(
            AuthEventKind::SignedIn,
            &session.access_token,
            None,
            Some(session.identity.clone()),
        );
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let response = self
            .request(reqwest::Method::POST, "/signup")
            .json(&PasswordCredentials { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session(token) => {
                let session: AuthSession = token.into();
                info!("Registered identity {}", session.identity.id);
                self.emit(
                    AuthEventKind::SignedIn,
                    &session.access_token,
                    None,
                    Some(session.identity.clone()),
                );
                Ok(SignUpOutcome::Session(session))
            }
            SignUpResponse::User(user) => {
                info!("Registered identity {} pending email confirmation", user.id);
                Ok(SignUpOutcome::ConfirmationRequired(user.into()))
            }
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .request(reqwest::Method::POST, "/logout")
            .bearer_auth(access_token)
            .send()
            .await?;

        // An already-invalid token is as signed out as it gets.
        let status = response.status();
        if !status.is_success() && status != StatusCode::UNAUTHORIZED {
            return Err(error_from_response(response).await);
        }

        self.emit(AuthEventKind::SignedOut, access_token, None, None);
        Ok(())
    }

    async fn refresh_session(
        &self,
        previous_token: &str,
        refresh_token: &str,
    ) -> Result<AuthSession, AuthError> {
        let response = self
            .request(reqwest::Method::POST, "/token?grant_type=refresh_token")
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let session: AuthSession = response.json::<TokenResponse>().await?.into();
        self.emit(
            AuthEventKind::TokenRefreshed,
            &session.access_token,
            Some(previous_token),
            Some(session.identity.clone()),
        );
        Ok(session)
    }
}

async fn error_from_response(response: Response) -> AuthError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    classify_error(status, &body)
}

fn classify_error(status: u16, body: &str) -> AuthError {
    let parsed = serde_json::from_str::<ErrorBody>(body).unwrap_or_default();
    if parsed.error.as_deref() == Some("invalid_grant") {
        return AuthError::InvalidCredentials;
    }
    let message = parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| body.to_string());

    if status == 429 || status >= 500 {
        AuthError::Unavailable { status, message }
    } else {
        AuthError::Rejected { status, message }
    }
}
