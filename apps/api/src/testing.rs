//! In-memory collaborators and an app harness for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use crate::access::QuotaConfig;
use crate::auth::{
    AuthError, AuthEvent, AuthEventKind, AuthProvider, AuthSession, Identity, SignUpOutcome,
};
use crate::listings::ListingRepository;
use crate::models::listing::{Listing, ListingUpdate, NewListing};
use crate::models::patch::Patch;
use crate::models::profile::{default_username, NewProfile, Profile, ProfileUpdate, Tier};
use crate::profile::{ProfileRepository, ProfileSynchronizer, RepoError};
use crate::routes::build_router;
use crate::session::{SessionHub, SessionTimings};
use crate::state::AppState;
use crate::storage::{MediaStore, StorageError};

pub const PASSWORD: &str = "password123";

pub fn identity(email: &str) -> Identity {
    Identity {
        id: Uuid::new_v4(),
        email: email.to_string(),
    }
}

pub fn profile_for(identity: &Identity, tier: Tier) -> Profile {
    let now = Utc::now();
    Profile {
        id: identity.id,
        username: default_username(&identity.email),
        name: identity.email.split('@').next().unwrap_or_default().to_string(),
        tier,
        is_admin: false,
        phone: None,
        location: None,
        bio: None,
        avatar_url: None,
        created_at: now,
        updated_at: now,
    }
}

fn apply_patch(patch: Patch<String>, column: &mut Option<String>) {
    match patch {
        Patch::Keep => {}
        Patch::Clear => *column = None,
        Patch::Set(v) => *column = Some(v),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Auth
// ────────────────────────────────────────────────────────────────────────────

pub struct FakeAuth {
    accounts: Mutex<HashMap<String, (String, Identity)>>,
    access_tokens: Mutex<HashMap<String, Identity>>,
    refresh_tokens: Mutex<HashMap<String, Identity>>,
    events: broadcast::Sender<AuthEvent>,
    fail_sessions: AtomicBool,
    require_confirmation: AtomicBool,
    session_delay: Mutex<Option<Duration>>,
}

impl Default for FakeAuth {
    fn default() -> Self {
        Self {
            accounts: Mutex::default(),
            access_tokens: Mutex::default(),
            refresh_tokens: Mutex::default(),
            events: broadcast::channel(64).0,
            fail_sessions: AtomicBool::new(false),
            require_confirmation: AtomicBool::new(false),
            session_delay: Mutex::default(),
        }
    }
}

impl FakeAuth {
    pub async fn register(&self, email: &str) -> Identity {
        self.accounts
            .lock()
            .await
            .entry(email.to_string())
            .or_insert_with(|| (PASSWORD.to_string(), identity(email)))
            .1
            .clone()
    }

    pub async fn sign_in_as(&self, email: &str) -> AuthSession {
        self.register(email).await;
        self.sign_in_with_password(email, PASSWORD)
            .await
            .expect("registered account signs in")
    }

    /// Invalidates a token at the service without emitting any event, as
    /// happens on expiry or a revocation made by another client.
    pub async fn expire(&self, access_token: &str) {
        self.access_tokens.lock().await.remove(access_token);
    }

    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    pub fn require_confirmation(&self, required: bool) {
        self.require_confirmation.store(required, Ordering::SeqCst);
    }

    pub async fn set_session_delay(&self, delay: Option<Duration>) {
        *self.session_delay.lock().await = delay;
    }

    async fn issue(&self, identity: Identity) -> AuthSession {
        let session = AuthSession {
            access_token: format!("access-{}", Uuid::new_v4()),
            refresh_token: format!("refresh-{}", Uuid::new_v4()),
            identity,
        };
        self.access_tokens
            .lock()
            .await
            .insert(session.access_token.clone(), session.identity.clone());
        self.refresh_tokens
            .lock()
            .await
            .insert(session.refresh_token.clone(), session.identity.clone());
        session
    }

    fn emit(
        &self,
        kind: AuthEventKind,
        token: &str,
        previous: Option<&str>,
        who: Option<Identity>,
    ) {
        let _ = self.events.send(AuthEvent {
            kind,
            access_token: token.to_string(),
            previous_token: previous.map(str::to_string),
            identity: who,
        });
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn get_session(&self, access_token: &str) -> Result<Option<Identity>, AuthError> {
        let delay = *self.session_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(AuthError::Unavailable {
                status: 503,
                message: "auth down".to_string(),
            });
        }
        Ok(self.access_tokens.lock().await.get(access_token).cloned())
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let account = self.accounts.lock().await.get(email).cloned();
        let identity = match account {
            Some((stored, identity)) if stored == password => identity,
            _ => return Err(AuthError::InvalidCredentials),
        };
        let session = self.issue(identity).await;
        self.emit(
            AuthEventKind::SignedIn,
            &session.access_token,
            None,
            Some(session.identity.clone()),
        );
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let identity = {
            let mut accounts = self.accounts.lock().await;
            if accounts.contains_key(email) {
                return Err(AuthError::Rejected {
                    status: 422,
                    message: "User already registered".to_string(),
                });
            }
            let identity = identity(email);
            accounts.insert(email.to_string(), (password.to_string(), identity.clone()));
            identity
        };

        if self.require_confirmation.load(Ordering::SeqCst) {
            return Ok(SignUpOutcome::ConfirmationRequired(identity));
        }
        let session = self.issue(identity).await;
        self.emit(
            AuthEventKind::SignedIn,
            &session.access_token,
            None,
            Some(session.identity.clone()),
        );
        Ok(SignUpOutcome::Session(session))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.access_tokens.lock().await.remove(access_token);
        self.emit(AuthEventKind::SignedOut, access_token, None, None);
        Ok(())
    }

    async fn refresh_session(
        &self,
        previous_token: &str,
        refresh_token: &str,
    ) -> Result<AuthSession, AuthError> {
        let identity = self
            .refresh_tokens
            .lock()
            .await
            .remove(refresh_token)
            .ok_or_else(|| AuthError::Rejected {
                status: 400,
                message: "Invalid Refresh Token".to_string(),
            })?;
        self.access_tokens.lock().await.remove(previous_token);
        let session = self.issue(identity).await;
        self.emit(
            AuthEventKind::TokenRefreshed,
            &session.access_token,
            Some(previous_token),
            Some(session.identity.clone()),
        );
        Ok(session)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Profiles
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryProfiles {
    rows: Mutex<Vec<Profile>>,
    fail_reads: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
    racer: Mutex<Option<Identity>>,
}

impl InMemoryProfiles {
    pub async fn seed(&self, identity: &Identity, tier: Tier) -> Profile {
        let profile = profile_for(identity, tier);
        self.rows.lock().await.push(profile.clone());
        profile
    }

    pub async fn seed_admin(&self, identity: &Identity) -> Profile {
        let profile = Profile {
            is_admin: true,
            ..profile_for(identity, Tier::Free)
        };
        self.rows.lock().await.push(profile.clone());
        profile
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub async fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock().await = delay;
    }

    /// The next insert for this identity finds its row already created by
    /// someone else.
    pub async fn race_insert_for(&self, identity: &Identity) {
        *self.racer.lock().await = Some(identity.clone());
    }

    pub async fn row_count(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn rows_for(&self, id: Uuid) -> usize {
        self.rows.lock().await.iter().filter(|p| p.id == id).count()
    }

    async fn modify(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut Profile),
    ) -> Result<Profile, RepoError> {
        let mut rows = self.rows.lock().await;
        let profile = rows
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RepoError::NotFound)?;
        apply(profile);
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfiles {
    async fn get(&self, id: Uuid) -> Result<Profile, RepoError> {
        let delay = *self.read_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepoError::Database(sqlx::Error::PoolTimedOut));
        }
        self.rows
            .lock()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn insert(&self, profile: &NewProfile) -> Result<Profile, RepoError> {
        let racer = self.racer.lock().await.take();
        let mut rows = self.rows.lock().await;
        if let Some(racer) = racer.filter(|r| r.id == profile.id) {
            rows.push(profile_for(&racer, Tier::Free));
        }

        if rows.iter().any(|p| p.id == profile.id) {
            return Err(RepoError::Conflict("profiles_pkey".to_string()));
        }
        if rows.iter().any(|p| p.username == profile.username) {
            return Err(RepoError::Conflict("profiles_username_key".to_string()));
        }

        let now = Utc::now();
        let created = Profile {
            id: profile.id,
            username: profile.username.clone(),
            name: profile.name.clone(),
            tier: profile.tier,
            is_admin: profile.is_admin,
            phone: None,
            location: None,
            bio: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        rows.push(created.clone());
        Ok(created)
    }

    async fn update_details(&self, id: Uuid, update: &ProfileUpdate) -> Result<Profile, RepoError> {
        if let Some(username) = &update.username {
            let taken = self
                .rows
                .lock()
                .await
                .iter()
                .any(|p| p.id != id && &p.username == username);
            if taken {
                return Err(RepoError::Conflict("profiles_username_key".to_string()));
            }
        }
        let update = update.clone();
        self.modify(id, move |p| {
            if let Some(v) = update.username {
                p.username = v;
            }
            if let Some(v) = update.name {
                p.name = v;
            }
            apply_patch(update.phone, &mut p.phone);
            apply_patch(update.location, &mut p.location);
            apply_patch(update.bio, &mut p.bio);
        })
        .await
    }

    async fn set_avatar(&self, id: Uuid, avatar_url: &str) -> Result<Profile, RepoError> {
        let url = avatar_url.to_string();
        self.modify(id, move |p| p.avatar_url = Some(url)).await
    }

    async fn set_tier(&self, id: Uuid, tier: Tier) -> Result<Profile, RepoError> {
        self.modify(id, move |p| p.tier = tier).await
    }

    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<Profile, RepoError> {
        self.modify(id, move |p| p.is_admin = is_admin).await
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Profile>, RepoError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_by_tier(&self) -> Result<Vec<(Tier, i64)>, RepoError> {
        let rows = self.rows.lock().await;
        Ok(Tier::ALL
            .into_iter()
            .map(|tier| (tier, rows.iter().filter(|p| p.tier == tier).count() as i64))
            .filter(|(_, count)| *count > 0)
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Listings
// ────────────────────────────────────────────────────────────────────────────

/// Rows are kept in insertion order; "newest first" is reverse order.
#[derive(Default)]
pub struct InMemoryListings {
    rows: Mutex<Vec<Listing>>,
}

impl InMemoryListings {
    pub async fn count_for(&self, owner_id: Uuid) -> usize {
        self.rows
            .lock()
            .await
            .iter()
            .filter(|l| l.owner_id == owner_id)
            .count()
    }

    async fn modify(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut Listing),
    ) -> Result<Listing, RepoError> {
        let mut rows = self.rows.lock().await;
        let listing = rows
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(RepoError::NotFound)?;
        apply(listing);
        listing.updated_at = Utc::now();
        Ok(listing.clone())
    }
}

#[async_trait]
impl ListingRepository for InMemoryListings {
    async fn create(
        &self,
        listing: &NewListing,
        max_per_owner: Option<u32>,
    ) -> Result<Listing, RepoError> {
        let mut rows = self.rows.lock().await;
        let used = rows.iter().filter(|l| l.owner_id == listing.owner_id).count();
        if max_per_owner.is_some_and(|max| used >= max as usize) {
            return Err(RepoError::LimitReached);
        }
        let now = Utc::now();
        let created = Listing {
            id: listing.id,
            owner_id: listing.owner_id,
            title: listing.title.clone(),
            description: listing.description.clone(),
            price_cents: listing.price_cents,
            category: listing.category.clone(),
            location: listing.location.clone(),
            media_path: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        rows.push(created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Listing, RepoError> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn update(&self, id: Uuid, update: &ListingUpdate) -> Result<Listing, RepoError> {
        let update = update.clone();
        self.modify(id, move |l| {
            if let Some(v) = update.title {
                l.title = v;
            }
            if let Some(v) = update.description {
                l.description = v;
            }
            if let Some(v) = update.price_cents {
                l.price_cents = v;
            }
            apply_patch(update.category, &mut l.category);
            apply_patch(update.location, &mut l.location);
            if let Some(v) = update.is_active {
                l.is_active = v;
            }
        })
        .await
    }

    async fn set_media(&self, id: Uuid, media_path: &str) -> Result<Listing, RepoError> {
        let path = media_path.to_string();
        self.modify(id, move |l| l.media_path = Some(path)).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|l| l.id != id);
        if rows.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Listing>, RepoError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .rev()
            .filter(|l| l.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: Option<u32>) -> Result<Vec<Listing>, RepoError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .rev()
            .filter(|l| l.is_active)
            .take(limit.map_or(usize::MAX, |n| n as usize))
            .cloned()
            .collect())
    }

    async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Listing>, RepoError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64, RepoError> {
        Ok(self.rows.lock().await.len() as i64)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Media
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryMedia {
    uploads: Mutex<Vec<(String, String, usize)>>,
}

impl InMemoryMedia {
    pub async fn uploaded_paths(&self) -> Vec<String> {
        self.uploads
            .lock()
            .await
            .iter()
            .map(|(path, _, _)| path.clone())
            .collect()
    }
}

#[async_trait]
impl MediaStore for InMemoryMedia {
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.uploads
            .lock()
            .await
            .push((path.to_string(), content_type.to_string(), body.len()));
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://cdn.test/{path}")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// App harness
// ────────────────────────────────────────────────────────────────────────────

pub struct TestApp {
    pub state: AppState,
    pub auth: Arc<FakeAuth>,
    pub profiles: Arc<InMemoryProfiles>,
    pub listings: Arc<InMemoryListings>,
    pub media: Arc<InMemoryMedia>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(QuotaConfig::default(), Duration::from_secs(2))
    }

    pub fn with(quotas: QuotaConfig, session_wait: Duration) -> Self {
        let auth = Arc::new(FakeAuth::default());
        let profiles = Arc::new(InMemoryProfiles::default());
        let listings = Arc::new(InMemoryListings::default());
        let media = Arc::new(InMemoryMedia::default());
        let sessions = Arc::new(SessionHub::new(
            auth.clone(),
            ProfileSynchronizer::new(profiles.clone()),
            SessionTimings {
                wait: session_wait,
                ..SessionTimings::default()
            },
        ));
        let state = AppState {
            auth: auth.clone(),
            profiles: profiles.clone(),
            listings: listings.clone(),
            media: media.clone(),
            sessions,
            quotas,
        };
        Self {
            state,
            auth,
            profiles,
            listings,
            media,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let body = match body {
            Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::json!(null)
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::json!(null))
        };
        (status, json)
    }
}
