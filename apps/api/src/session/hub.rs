use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::models::profile::ProfileState;
use crate::profile::sync::ProfileSynchronizer;
use crate::session::store::{SessionSnapshot, SessionStore};

#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
    /// How long a request waits for a fresh store to resolve.
    pub wait: Duration,
    /// How often each store re-checks its token with the auth service.
    pub revalidate: Duration,
    /// Stores unused for this long are dropped.
    pub idle: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(3),
            revalidate: Duration::from_secs(60),
            idle: Duration::from_secs(30 * 60),
        }
    }
}

/// Registry of live session stores, keyed by access token.
///
/// Stores are created on first use of a token. They are evicted once they
/// resolve to "no identity" or sit unused for `idle`, so unknown, revoked and
/// abandoned tokens do not accumulate.
pub struct SessionHub {
    stores: RwLock<HashMap<String, Arc<SessionStore>>>,
    auth: Arc<dyn AuthProvider>,
    sync: ProfileSynchronizer,
    timings: SessionTimings,
}

impl SessionHub {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        sync: ProfileSynchronizer,
        timings: SessionTimings,
    ) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            auth,
            sync,
            timings,
        }
    }

    /// Sweeps the hub every `every` until the hub is dropped.
    pub fn spawn_sweeper(hub: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(hub);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(hub) = weak.upgrade() else { break };
                hub.sweep().await;
            }
        })
    }

    /// Returns the store for `token`, starting one if needed.
    pub async fn open(&self, token: &str) -> Arc<SessionStore> {
        if let Some(store) = self.stores.read().await.get(token) {
            store.touch();
            return store.clone();
        }

        let mut stores = self.stores.write().await;
        stores
            .entry(token.to_string())
            .or_insert_with(|| {
                debug!("Starting session store");
                Arc::new(SessionStore::spawn(
                    token.to_string(),
                    self.auth.clone(),
                    self.sync.clone(),
                    self.timings.revalidate,
                ))
            })
            .clone()
    }

    /// Current snapshot for `token`, waiting up to the configured time for the
    /// first resolution.
    pub async fn resolve(&self, token: &str) -> SessionSnapshot {
        let store = self.open(token).await;
        let snapshot = store.wait_checked(self.timings.wait).await;
        if snapshot.auth_checked && snapshot.identity.is_none() {
            self.close(token).await;
        }
        snapshot
    }

    pub async fn refresh_profile(&self, token: &str) -> SessionSnapshot {
        let store = self.open(token).await;
        store.wait_checked(self.timings.wait).await;
        store.refresh_profile().await;
        store.snapshot()
    }

    /// Refreshes every live session signed in as `user_id`, e.g. after an
    /// admin changed that user's tier.
    pub async fn refresh_identity(&self, user_id: Uuid) -> Vec<ProfileState> {
        let matching: Vec<Arc<SessionStore>> = self
            .stores
            .read()
            .await
            .values()
            .filter(|store| {
                store
                    .snapshot()
                    .identity
                    .is_some_and(|identity| identity.id == user_id)
            })
            .cloned()
            .collect();

        let mut refreshed = Vec::with_capacity(matching.len());
        for store in matching {
            refreshed.push(store.refresh_profile().await);
        }
        refreshed
    }

    /// Moves a store to its rotated token. The store itself follows the
    /// rotation through the auth event stream.
    pub async fn rekey(&self, old_token: &str, new_token: &str) {
        let mut stores = self.stores.write().await;
        if let Some(store) = stores.remove(old_token) {
            stores.insert(new_token.to_string(), store);
        }
    }

    pub async fn close(&self, token: &str) {
        if self.stores.write().await.remove(token).is_some() {
            debug!("Closed session store");
        }
    }

    /// Drops stores that are signed out or idle. Returns how many went.
    pub async fn sweep(&self) -> usize {
        let idle = self.timings.idle;
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|_, store| {
            let snapshot = store.snapshot();
            let signed_out = snapshot.auth_checked && snapshot.identity.is_none();
            !signed_out && store.idle_for() < idle
        });
        let removed = before - stores.len();
        if removed > 0 {
            info!("Swept {removed} session stores, {} live", stores.len());
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.stores.read().await.len()
    }
}
