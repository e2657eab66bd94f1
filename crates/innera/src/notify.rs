//! Best-effort notifications.
//!
//! A coordinator that wants to tell a user something hands the notification
//! to [`dispatch`], which runs delivery on a detached task. Delivery errors
//! are logged at `warn` and otherwise ignored: the primary operation has
//! already committed by the time a notification is sent.

use std::sync::Arc;

use async_trait::async_trait;
use innera_core::Notification;
use innera_store::Store;
use tokio::task::JoinHandle;

/// Somewhere notifications go.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Persists notifications as rows in the relational store.
pub struct StoreNotifier<S> {
    store: Arc<S>,
}

impl<S> StoreNotifier<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store> Notifier for StoreNotifier<S> {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        self.store
            .transaction(move |tx| tx.insert_notification(&notification))
            .await?;
        Ok(())
    }
}

/// Deliver on a detached task. The handle is only useful to tests.
pub fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) -> JoinHandle<()> {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        let user_id = notification.user_id;
        let kind = notification.kind;
        match notifier.notify(notification).await {
            Ok(()) => tracing::debug!(user_id = %user_id, kind = %kind, "notification delivered"),
            Err(e) => tracing::warn!(
                user_id = %user_id,
                kind = %kind,
                error = %e,
                "failed to deliver notification"
            ),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use innera_core::{NotificationKind, UserId};
    use innera_store::{MemoryStore, StoreExt};

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        async fn notify(&self, _: Notification) -> anyhow::Result<()> {
            anyhow::bail!("push gateway unavailable")
        }
    }

    #[tokio::test]
    async fn test_store_notifier_persists() {
        let store = Arc::new(MemoryStore::new());
        let notifier: Arc<dyn Notifier> = Arc::new(StoreNotifier::new(store.clone()));
        let user = UserId::new();

        dispatch(
            &notifier,
            Notification::new(user, NotificationKind::PartnerRevoked, "Partner disconnected", Utc::now()),
        )
        .await
        .unwrap();

        let rows = store.notifications_for(user).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, NotificationKind::PartnerRevoked);
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let notifier: Arc<dyn Notifier> = Arc::new(Failing);
        let handle = dispatch(
            &notifier,
            Notification::new(UserId::new(), NotificationKind::PartnerAccepted, "x", Utc::now()),
        );
        assert!(handle.await.is_ok());
    }
}
