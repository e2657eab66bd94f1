//! Version-checked entry writes.
//!
//! Every update carries the version the client last saw. The write applies
//! only if that version is still current; otherwise the caller gets
//! `Conflict` and must refetch. Last write wins is never an outcome.

use std::sync::Arc;

use chrono::Utc;
use innera_core::{CircleId, Entry, EntryId, EntryPatch, NewEntry, UserId};
use innera_perms::{
    can_delete, can_post_to_circle, can_restore, can_view, require, MembershipContext, Viewer,
};
use innera_store::{Store, StoreTx, VersionedUpdate};

use crate::error::{InneraError, Result};
use crate::viewer::load_viewer_tx;

const NOT_FOUND: &str = "Entry not found";
const MODIFIED: &str = "Entry has been modified, refresh and retry";

/// Entry create, read, update, delete, and restore around the version guard.
pub struct EntryConcurrencyGuard<S> {
    store: Arc<S>,
}

impl<S: Store> EntryConcurrencyGuard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Store a new entry at version 1.
    ///
    /// Circle-scoped entries require the author to be an ACTIVE member of
    /// the target circle.
    pub async fn create(&self, new: NewEntry) -> Result<Entry> {
        let now = Utc::now();
        let entry = self
            .store
            .transaction(move |tx| -> Result<Entry> {
                let entry = new.into_entry(now)?;
                if let Some(circle_id) = entry.circle_id {
                    require_member(tx, entry.author_id, circle_id)?;
                }
                tx.insert_entry(&entry)?;
                Ok(entry)
            })
            .await?;

        tracing::debug!(entry_id = %entry.id, visibility = %entry.visibility, "entry created");
        Ok(entry)
    }

    /// Fetch an entry on behalf of `viewer`.
    ///
    /// Missing and soft-deleted entries are `NotFound`; entries the viewer may
    /// not see are `Forbidden`.
    pub async fn get_for_viewer(&self, viewer: UserId, entry_id: EntryId) -> Result<Entry> {
        self.store
            .transaction(move |tx| -> Result<Entry> {
                let entry = live_entry(tx, entry_id)?;
                let viewer = load_viewer_tx(tx, viewer)?;
                require(can_view(&entry, &viewer), "view this entry")?;
                Ok(entry)
            })
            .await
    }

    /// Apply `patch` if the entry is still at `expected_version`.
    ///
    /// Zero affected rows is disambiguated by reading the row back: gone, not
    /// the caller's, or deleted is `NotFound`; a different version is
    /// `Conflict`.
    pub async fn update(
        &self,
        entry_id: EntryId,
        author: UserId,
        expected_version: i64,
        patch: EntryPatch,
    ) -> Result<Entry> {
        if patch.is_empty() {
            return Err(InneraError::bad_request("Nothing to update"));
        }
        let now = Utc::now();

        let entry = self
            .store
            .transaction(move |tx| -> Result<Entry> {
                let current = tx
                    .get_entry(entry_id)?
                    .filter(|e| e.author_id == author && !e.is_deleted())
                    .ok_or_else(|| InneraError::not_found(NOT_FOUND))?;
                // A stale version is a conflict before any scope or permission check
                if current.version != expected_version {
                    return Err(stale(entry_id, expected_version, current.version));
                }

                let (visibility, circle_id) = patch.resolve_scope(&current)?;
                if patch.changes_scope() {
                    if let Some(circle_id) = circle_id {
                        require_member(tx, author, circle_id)?;
                    }
                }

                let applied = tx.update_entry_versioned(&VersionedUpdate {
                    id: entry_id,
                    author_id: author,
                    expected_version,
                    content_encrypted: patch.content_encrypted,
                    visibility,
                    circle_id,
                    updated_at: now,
                })?;
                if applied == 0 {
                    return Err(disambiguate(tx, entry_id, author, expected_version));
                }

                tx.get_entry(entry_id)?
                    .ok_or_else(|| InneraError::not_found(NOT_FOUND))
            })
            .await?;

        tracing::debug!(entry_id = %entry.id, version = entry.version, "entry updated");
        Ok(entry)
    }

    /// Soft-delete. The author, or an OWNER/ADMIN of the entry's circle.
    pub async fn soft_delete(&self, actor: UserId, entry_id: EntryId) -> Result<()> {
        let now = Utc::now();
        self.store
            .transaction(move |tx| -> Result<()> {
                let entry = live_entry(tx, entry_id)?;
                let viewer = load_viewer_tx(tx, actor)?;
                require(can_delete(&entry, &viewer), "delete this entry")?;
                if tx.set_entry_deleted(entry_id, Some(now))? == 0 {
                    return Err(InneraError::not_found(NOT_FOUND));
                }
                Ok(())
            })
            .await?;

        tracing::debug!(entry_id = %entry_id, deleted_by = %actor, "entry deleted");
        Ok(())
    }

    /// Undo a soft delete. Author only; the version is unchanged.
    pub async fn restore(&self, actor: UserId, entry_id: EntryId) -> Result<Entry> {
        let entry = self
            .store
            .transaction(move |tx| -> Result<Entry> {
                let entry = tx
                    .get_entry(entry_id)?
                    .ok_or_else(|| InneraError::not_found(NOT_FOUND))?;
                require(can_restore(&entry, &Viewer::new(actor)), "restore this entry")?;
                if !entry.is_deleted() || tx.set_entry_deleted(entry_id, None)? == 0 {
                    return Err(InneraError::conflict("Entry is not deleted; refresh and retry"));
                }
                tx.get_entry(entry_id)?
                    .ok_or_else(|| InneraError::not_found(NOT_FOUND))
            })
            .await?;

        tracing::debug!(entry_id = %entry_id, "entry restored");
        Ok(entry)
    }
}

fn live_entry(tx: &mut dyn StoreTx, entry_id: EntryId) -> Result<Entry> {
    tx.get_entry(entry_id)?
        .filter(|e| !e.is_deleted())
        .ok_or_else(|| InneraError::not_found(NOT_FOUND))
}

fn require_member(tx: &mut dyn StoreTx, user: UserId, circle_id: CircleId) -> Result<()> {
    let viewer = match tx.get_membership(circle_id, user)? {
        Some(m) => Viewer::new(user).with_membership(circle_id, MembershipContext::from(&m)),
        None => Viewer::new(user),
    };
    require(can_post_to_circle(&viewer, circle_id), "post to this circle")?;
    Ok(())
}

fn stale(entry_id: EntryId, expected: i64, actual: i64) -> InneraError {
    tracing::debug!(entry_id = %entry_id, expected, actual, "stale entry version");
    InneraError::conflict(MODIFIED)
}

/// Explain why a versioned write touched no rows.
fn disambiguate(tx: &mut dyn StoreTx, entry_id: EntryId, author: UserId, expected: i64) -> InneraError {
    match tx.get_entry(entry_id) {
        Ok(Some(e)) if e.author_id == author && !e.is_deleted() => stale(entry_id, expected, e.version),
        Ok(_) => InneraError::not_found(NOT_FOUND),
        Err(e) => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use innera_core::{CircleRole, ErrorKind, HistoryPolicy, Membership, Visibility};
    use innera_store::MemoryStore;

    fn guard() -> (Arc<MemoryStore>, EntryConcurrencyGuard<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), EntryConcurrencyGuard::new(store))
    }

    fn private(author: UserId) -> NewEntry {
        NewEntry {
            author_id: author,
            content_encrypted: Bytes::from_static(b"v1"),
            visibility: Visibility::Private,
            circle_id: None,
        }
    }

    fn content(bytes: &'static [u8]) -> EntryPatch {
        EntryPatch {
            content_encrypted: Some(Bytes::from_static(bytes)),
            ..Default::default()
        }
    }

    async fn join(store: &MemoryStore, circle: CircleId, user: UserId, role: CircleRole) {
        let m = Membership::active(circle, user, role, HistoryPolicy::All, Utc::now());
        store.transaction(move |tx| tx.insert_membership(&m)).await.unwrap();
    }

    #[tokio::test]
    async fn test_version_increments_by_one_and_stale_conflicts() {
        let (_, guard) = guard();
        let author = UserId::new();
        let entry = guard.create(private(author)).await.unwrap();
        assert_eq!(entry.version, 1);

        let e2 = guard.update(entry.id, author, 1, content(b"v2")).await.unwrap();
        assert_eq!(e2.version, 2);
        let e3 = guard.update(entry.id, author, 2, content(b"v3")).await.unwrap();
        assert_eq!(e3.version, 3);
        assert_eq!(&e3.content_encrypted[..], b"v3");

        let err = guard.update(entry.id, author, 2, content(b"stale")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("refresh and retry"));

        let err = guard.update(entry.id, author, 99, content(b"future")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_not_found_is_distinct_from_conflict() {
        let (_, guard) = guard();
        let author = UserId::new();
        let entry = guard.create(private(author)).await.unwrap();

        let err = guard.update(EntryId::new(), author, 1, content(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = guard.update(entry.id, UserId::new(), 1, content(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        guard.soft_delete(author, entry.id).await.unwrap();
        let err = guard.update(entry.id, author, 1, content(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_scope_changes_are_validated() {
        let (store, guard) = guard();
        let author = UserId::new();
        let entry = guard.create(private(author)).await.unwrap();
        let circle = CircleId::new();

        let to_circle = EntryPatch {
            visibility: Some(Visibility::Circle),
            circle_id: Some(circle),
            ..Default::default()
        };
        let err = guard.update(entry.id, author, 1, to_circle.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let missing_circle = EntryPatch {
            visibility: Some(Visibility::Circle),
            ..Default::default()
        };
        let err = guard.update(entry.id, author, 1, missing_circle).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        join(&store, circle, author, CircleRole::Member).await;
        let moved = guard.update(entry.id, author, 1, to_circle).await.unwrap();
        assert_eq!(moved.visibility, Visibility::Circle);
        assert_eq!(moved.circle_id, Some(circle));
        assert_eq!(moved.version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_wins_over_scope_errors() {
        let (_, guard) = guard();
        let author = UserId::new();
        let entry = guard.create(private(author)).await.unwrap();
        guard.update(entry.id, author, 1, content(b"v2")).await.unwrap();

        // Not a member of this circle, but the version is checked first
        let to_foreign_circle = EntryPatch {
            visibility: Some(Visibility::Circle),
            circle_id: Some(CircleId::new()),
            ..Default::default()
        };
        let err = guard.update(entry.id, author, 1, to_foreign_circle).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("refresh and retry"));

        let missing_circle = EntryPatch {
            visibility: Some(Visibility::Circle),
            ..Default::default()
        };
        let err = guard.update(entry.id, author, 1, missing_circle).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_create_requires_membership_for_circle_entries() {
        let (store, guard) = guard();
        let author = UserId::new();
        let circle = CircleId::new();
        let new = NewEntry {
            author_id: author,
            content_encrypted: Bytes::from_static(b"c"),
            visibility: Visibility::FutureCircleOnly,
            circle_id: Some(circle),
        };
        let err = guard.create(new.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        join(&store, circle, author, CircleRole::Member).await;
        assert!(guard.create(new).await.is_ok());

        let bad = NewEntry {
            circle_id: Some(circle),
            ..private(author)
        };
        assert_eq!(guard.create(bad).await.unwrap_err().kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_get_for_viewer() {
        let (_, guard) = guard();
        let author = UserId::new();
        let entry = guard.create(private(author)).await.unwrap();

        assert_eq!(guard.get_for_viewer(author, entry.id).await.unwrap().id, entry.id);
        let err = guard.get_for_viewer(UserId::new(), entry.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        guard.soft_delete(author, entry.id).await.unwrap();
        let err = guard.get_for_viewer(author, entry.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_and_restore_keep_version() {
        let (store, guard) = guard();
        let author = UserId::new();
        let circle = CircleId::new();
        join(&store, circle, author, CircleRole::Member).await;
        let admin = UserId::new();
        join(&store, circle, admin, CircleRole::Admin).await;
        let member = UserId::new();
        join(&store, circle, member, CircleRole::Member).await;

        let entry = guard
            .create(NewEntry {
                author_id: author,
                content_encrypted: Bytes::from_static(b"c"),
                visibility: Visibility::Circle,
                circle_id: Some(circle),
            })
            .await
            .unwrap();
        let entry = guard.update(entry.id, author, 1, content(b"c2")).await.unwrap();

        let err = guard.soft_delete(member, entry.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        guard.soft_delete(admin, entry.id).await.unwrap();

        let err = guard.restore(admin, entry.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let restored = guard.restore(author, entry.id).await.unwrap();
        assert!(restored.deleted_at.is_none());
        assert_eq!(restored.version, 2);

        let err = guard.restore(author, entry.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_one_winner_per_version() {
        let (_, guard) = guard();
        let author = UserId::new();
        let entry = guard.create(private(author)).await.unwrap();
        let guard = Arc::new(guard);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard.update(entry.id, author, 1, content(b"racer")).await
            }));
        }
        let mut winners = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(e) => {
                    assert_eq!(e.version, 2);
                    winners += 1;
                }
                Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(guard.get_for_viewer(author, entry.id).await.unwrap().version, 2);
    }
}
