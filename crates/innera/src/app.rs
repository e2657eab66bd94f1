//! The assembled service: one store, one key-value store, every coordinator.

use std::sync::Arc;

use innera_core::{Principal, UserId};
use innera_perms::Viewer;
use innera_session::TokenService;
use innera_store::{KvStore, LazyKv, MemoryKv, MemoryStore, SqliteKv, SqliteStore, Store};

use crate::circles::{CircleInviteCoordinator, CirclePolicy};
use crate::config::InneraConfig;
use crate::entries::EntryConcurrencyGuard;
use crate::error::Result;
use crate::notify::{Notifier, StoreNotifier};
use crate::pairing::PairingCoordinator;

/// Production wiring: SQLite with a key-value handle that connects on first use.
pub type SqliteInnera = Innera<SqliteStore, LazyKv<SqliteKv>>;

/// Test wiring: everything in memory.
pub type MemoryInnera = Innera<MemoryStore, MemoryKv>;

/// Every coordinator, sharing one store pair.
pub struct Innera<S, K> {
    config: InneraConfig,
    store: Arc<S>,
    kv: Arc<K>,
    tokens: TokenService<K>,
    pairing: PairingCoordinator<S, K>,
    circles: CircleInviteCoordinator<S>,
    entries: EntryConcurrencyGuard<S>,
}

impl<S: Store, K: KvStore + 'static> Innera<S, K> {
    /// Wire everything with notifications persisted to `store`.
    pub fn new(config: InneraConfig, store: Arc<S>, kv: Arc<K>) -> Self {
        let notifier: Arc<dyn Notifier> = Arc::new(StoreNotifier::new(Arc::clone(&store)));
        Self::with_notifier(config, store, kv, notifier)
    }

    pub fn with_notifier(
        config: InneraConfig,
        store: Arc<S>,
        kv: Arc<K>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let tokens = TokenService::new(config.secret.clone(), config.session.clone(), Arc::clone(&kv));
        let pairing = PairingCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&kv),
            Arc::clone(&notifier),
            config.partner_invite_ttl,
        );
        let circles = CircleInviteCoordinator::new(
            Arc::clone(&store),
            notifier,
            CirclePolicy {
                max_members: config.max_circle_members,
                founding_invite: config.founding_invite,
                ad_hoc_invite: config.ad_hoc_invite,
            },
        );
        let entries = EntryConcurrencyGuard::new(Arc::clone(&store));

        Self {
            config,
            store,
            kv,
            tokens,
            pairing,
            circles,
            entries,
        }
    }

    pub fn config(&self) -> &InneraConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn kv(&self) -> &Arc<K> {
        &self.kv
    }

    pub fn tokens(&self) -> &TokenService<K> {
        &self.tokens
    }

    pub fn pairing(&self) -> &PairingCoordinator<S, K> {
        &self.pairing
    }

    pub fn circles(&self) -> &CircleInviteCoordinator<S> {
        &self.circles
    }

    pub fn entries(&self) -> &EntryConcurrencyGuard<S> {
        &self.entries
    }

    /// Resolve a bearer access token to its principal. Never touches the store.
    pub fn authenticate(&self, access_token: &str) -> Result<Principal> {
        let claims = self.tokens.verify_access(access_token)?;
        Ok(Principal {
            user_id: claims.user_id,
            email: claims.email,
        })
    }

    /// The viewer context for `user`.
    pub async fn viewer(&self, user: UserId) -> Result<Viewer> {
        crate::viewer::load_viewer(self.store.as_ref(), user).await
    }
}

impl SqliteInnera {
    /// Open the configured database, or an in-memory one if no path is set.
    ///
    /// The key-value handle shares the relational connection and is only
    /// initialized when first used.
    pub fn open(config: InneraConfig) -> Result<Self> {
        let store = match &config.database_path {
            Some(path) => SqliteStore::open(path)?,
            None => SqliteStore::open_memory()?,
        };
        let shared = store.kv();
        let kv = LazyKv::new(move || {
            let kv = shared.clone();
            async move { Ok(kv) }
        });
        tracing::info!(database = ?config.database_path, env = %config.environment, "innera opened");
        Ok(Self::new(config, Arc::new(store), Arc::new(kv)))
    }
}

impl MemoryInnera {
    pub fn in_memory(config: InneraConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()), Arc::new(MemoryKv::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use innera_core::User;
    use innera_store::StoreExt;

    #[tokio::test]
    async fn test_sqlite_wiring_connects_kv_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let config = InneraConfig::default().with_database_path(dir.path().join("innera.db"));
        let app = SqliteInnera::open(config).unwrap();
        assert!(!app.kv().is_initialized());

        let user = User::new("u1@example.com", None, Utc::now());
        app.store().insert_user(user.clone()).await.unwrap();
        let pair = app.tokens().issue_pair(&user.principal()).await.unwrap();
        assert!(app.kv().is_initialized());

        let principal = app.authenticate(&pair.access_token).unwrap();
        assert_eq!(principal.user_id, user.id);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_refresh_token() {
        let app = MemoryInnera::in_memory(InneraConfig::default());
        let user = User::new("u1@example.com", None, Utc::now());
        let pair = app.tokens().issue_pair(&user.principal()).await.unwrap();
        let err = app.authenticate(&pair.refresh_token).unwrap_err();
        assert_eq!(err.kind(), innera_core::ErrorKind::Unauthorized);
    }
}
