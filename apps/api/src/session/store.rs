//! Session Store: one background task per access token that mirrors the auth
//! collaborator's view of that token and keeps the matching profile in sync.
//!
//! Besides following auth events, the store re-checks its token every
//! `revalidate` interval so that expiry or revocation elsewhere is noticed.
//!
//! Invariants:
//! - `auth_checked` is a latch. It flips to true once the first session lookup
//!   and the profile fetch it triggered have both settled, and never reverts.
//! - At most one profile fetch is in flight. A new identity, a sign-out or a
//!   refresh drops the previous fetch future before anything else happens, so
//!   a stale result can never overwrite newer state.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::{AuthEvent, AuthEventKind, AuthProvider, Identity};
use crate::models::profile::ProfileState;
use crate::profile::sync::ProfileSynchronizer;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub auth_checked: bool,
    pub profile: ProfileState,
}

enum Command {
    RefreshProfile(oneshot::Sender<ProfileState>),
}

type PendingFetch = Pin<Box<dyn Future<Output = ProfileState> + Send>>;

pub struct SessionStore {
    snapshot: watch::Receiver<SessionSnapshot>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
    last_used: Mutex<Instant>,
}

impl SessionStore {
    pub fn spawn(
        access_token: String,
        auth: Arc<dyn AuthProvider>,
        sync: ProfileSynchronizer,
        revalidate: Duration,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::default());
        let (command_tx, command_rx) = mpsc::channel(16);
        // Subscribe before the first lookup so nothing in between is missed.
        let events = auth.on_auth_state_change();

        let driver = Driver {
            token: access_token,
            auth,
            sync,
            state: state_tx,
            events: Some(events),
            commands: command_rx,
            identity: None,
            profile: ProfileState::Unset,
            checked: false,
            pending: None,
            waiters: Vec::new(),
            revalidate,
            next_check: Instant::now() + revalidate,
        };

        Self {
            snapshot: state_rx,
            commands: command_tx,
            task: tokio::spawn(driver.run()),
            last_used: Mutex::new(Instant::now()),
        }
    }

    /// Marks the store as used by a request.
    pub fn touch(&self) {
        if let Ok(mut last_used) = self.last_used.lock() {
            *last_used = Instant::now();
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|last_used| last_used.elapsed())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Waits for `auth_checked`, giving up after `timeout` and returning
    /// whatever state the store has reached by then.
    pub async fn wait_checked(&self, timeout: Duration) -> SessionSnapshot {
        let mut rx = self.snapshot.clone();
        let checked = tokio::time::timeout(timeout, async move {
            rx.wait_for(|s| s.auth_checked).await.map(|s| s.clone())
        })
        .await;

        match checked {
            Ok(Ok(snapshot)) => snapshot,
            _ => self.snapshot(),
        }
    }

    /// Re-fetches the profile for the current identity and returns the result.
    pub async fn refresh_profile(&self) -> ProfileState {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(Command::RefreshProfile(reply))
            .await
            .is_err()
        {
            return self.snapshot().profile;
        }
        response.await.unwrap_or_else(|_| self.snapshot().profile)
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Driver {
    token: String,
    auth: Arc<dyn AuthProvider>,
    sync: ProfileSynchronizer,
    state: watch::Sender<SessionSnapshot>,
    events: Option<broadcast::Receiver<AuthEvent>>,
    commands: mpsc::Receiver<Command>,
    identity: Option<Identity>,
    profile: ProfileState,
    checked: bool,
    pending: Option<PendingFetch>,
    waiters: Vec<oneshot::Sender<ProfileState>>,
    revalidate: Duration,
    next_check: Instant,
}

impl Driver {
    async fn run(mut self) {
        self.resolve_session().await;

        loop {
            tokio::select! {
                profile = next_fetch(&mut self.pending) => {
                    self.pending = None;
                    self.finish_fetch(profile);
                }
                event = next_event(&mut self.events) => match event {
                    Ok(event) => self.on_event(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Session store missed {skipped} auth events, re-resolving");
                        self.resolve_session().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("Auth event stream closed");
                        self.events = None;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::RefreshProfile(reply)) => self.refresh(reply),
                    None => break,
                },
                _ = tokio::time::sleep_until(self.next_check) => {
                    debug!("Re-validating session");
                    self.resolve_session().await;
                }
            }
        }

        debug!("Session store stopped");
    }

    async fn resolve_session(&mut self) {
        self.next_check = Instant::now() + self.revalidate;
        let identity = match self.auth.get_session(&self.token).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Session lookup failed, treating as signed out: {e}");
                None
            }
        };
        if identity.is_none() && self.identity.is_some() {
            info!("Session no longer valid, signing out");
        }
        self.set_identity(identity);
    }

    fn on_event(&mut self, event: AuthEvent) {
        let ours = event.access_token == self.token
            || event.previous_token.as_deref() == Some(self.token.as_str());
        if !ours {
            return;
        }

        match event.kind {
            AuthEventKind::SignedIn | AuthEventKind::TokenRefreshed => {
                self.token = event.access_token;
                self.set_identity(event.identity);
            }
            AuthEventKind::SignedOut => self.set_identity(None),
        }
    }

    fn set_identity(&mut self, identity: Option<Identity>) {
        let changed = identity.as_ref().map(|i| i.id) != self.identity.as_ref().map(|i| i.id);
        self.identity = identity;

        match self.identity.clone() {
            None => {
                if self.pending.take().is_some() {
                    debug!("Signed out with a profile fetch in flight, cancelled");
                }
                self.profile = ProfileState::Unset;
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(ProfileState::Unset);
                }
            }
            Some(identity) if changed => {
                self.profile = ProfileState::Unset;
                self.start_fetch(identity);
            }
            Some(_) => {}
        }

        self.publish();
    }

    fn refresh(&mut self, reply: oneshot::Sender<ProfileState>) {
        match self.identity.clone() {
            Some(identity) => {
                self.waiters.push(reply);
                self.start_fetch(identity);
            }
            None => {
                let _ = reply.send(ProfileState::Unset);
            }
        }
    }

    fn start_fetch(&mut self, identity: Identity) {
        if self.pending.is_some() {
            debug!("Restarting profile fetch for {}", identity.id);
        }
        let sync = self.sync.clone();
        self.pending = Some(Box::pin(
            async move { sync.fetch_profile(&identity).await },
        ));
    }

    fn finish_fetch(&mut self, profile: ProfileState) {
        self.profile = profile;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(self.profile.clone());
        }
        self.publish();
    }

    fn publish(&mut self) {
        if self.pending.is_none() && !self.checked {
            self.checked = true;
            info!(
                "Session resolved: signed_in={} profile_loaded={}",
                self.identity.is_some(),
                self.profile.is_loaded()
            );
        }
        self.state.send_replace(SessionSnapshot {
            identity: self.identity.clone(),
            auth_checked: self.checked,
            profile: self.profile.clone(),
        });
    }
}

async fn next_fetch(pending: &mut Option<PendingFetch>) -> ProfileState {
    match pending {
        Some(fetch) => fetch.await,
        None => std::future::pending().await,
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<AuthEvent>>,
) -> Result<AuthEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
