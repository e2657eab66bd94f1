//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use innera::{InneraConfig, MemoryInnera, Notifier};
use innera_core::{
    CircleId, CircleInvite, Entry, InviteId, NewEntry, Notification, NotificationKind, User, UserId,
    Visibility,
};
use innera_store::{MemoryKv, MemoryStore, Store, StoreExt, StoreTx};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A notifier that keeps everything it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        self.seen
            .lock()
            .map_err(|_| anyhow::anyhow!("recorder poisoned"))?
            .push(notification);
        Ok(())
    }
}

impl RecordingNotifier {
    /// Everything recorded so far.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    /// Notifications are dispatched on detached tasks; poll until `count`
    /// have arrived or a second has passed.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..200 {
            let seen = self.snapshot();
            if seen.len() >= count {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.snapshot()
    }

    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.snapshot().into_iter().filter(|n| n.kind == kind).collect()
    }
}

/// An in-memory app plus handles to its parts.
pub struct TestFixture {
    pub app: Arc<MemoryInnera>,
    pub store: Arc<MemoryStore>,
    pub kv: Arc<MemoryKv>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestFixture {
    /// In-memory stores, test configuration, recording notifier.
    pub fn new() -> Self {
        Self::with_config(InneraConfig::default())
    }

    pub fn with_config(config: InneraConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let kv = Arc::new(MemoryKv::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let app = MemoryInnera::with_notifier(config, store.clone(), kv.clone(), notifier.clone());
        Self {
            app: Arc::new(app),
            store,
            kv,
            notifier,
        }
    }

    /// Insert a user with a unique address.
    pub async fn user(&self, name: &str) -> User {
        let user = User::new(
            format!("{}-{}@example.com", name, UserId::new()),
            Some(name.to_string()),
            Utc::now(),
        );
        self.store
            .insert_user(user.clone())
            .await
            .expect("insert user");
        user
    }

    /// Create a circle owned by `owner` and return its id.
    pub async fn circle(&self, owner: UserId, name: &str) -> CircleId {
        self.app
            .circles()
            .create_circle(owner, name, None)
            .await
            .expect("create circle")
            .circle
            .id
    }

    /// Insert an invite with exact limits, bypassing the configured defaults.
    pub async fn invite(&self, circle: CircleId, max_uses: u32, expires_at: DateTime<Utc>) -> CircleInvite {
        let invite = CircleInvite {
            id: InviteId::new(),
            circle_id: circle,
            invited_by: None,
            invite_code: format!("code-{}", InviteId::new()),
            expires_at,
            max_uses,
            used_count: 0,
            created_at: Utc::now(),
        };
        let row = invite.clone();
        self.store
            .transaction(move |tx: &mut dyn StoreTx| tx.insert_invite(&row))
            .await
            .expect("insert invite");
        invite
    }

    /// A private entry by `author`.
    pub async fn private_entry(&self, author: UserId) -> Entry {
        self.entry(author, Visibility::Private, None).await
    }

    pub async fn entry(&self, author: UserId, visibility: Visibility, circle: Option<CircleId>) -> Entry {
        self.app
            .entries()
            .create(NewEntry {
                author_id: author,
                content_encrypted: Bytes::from_static(b"ciphertext"),
                visibility,
                circle_id: circle,
            })
            .await
            .expect("create entry")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
