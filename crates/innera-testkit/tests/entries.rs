//! Versioned entry edits.

use std::sync::Arc;

use bytes::Bytes;
use innera::api::{self, PatchEntryRequest};
use innera_core::{EntryPatch, ErrorKind, HistoryPolicy, Visibility};
use innera_store::StoreExt;
use innera_testkit::TestFixture;

fn content(text: &'static str) -> EntryPatch {
    EntryPatch {
        content_encrypted: Some(Bytes::from_static(text.as_bytes())),
        ..EntryPatch::default()
    }
}

#[tokio::test]
async fn test_stale_version_conflicts() {
    let fixture = TestFixture::new();
    let author = fixture.user("author").await;
    let entry = fixture.private_entry(author.id).await;
    let guard = fixture.app.entries();

    // Walk the entry up to version 3
    guard.update(entry.id, author.id, 1, content("v2")).await.unwrap();
    let v3 = guard.update(entry.id, author.id, 2, content("v3")).await.unwrap();
    assert_eq!(v3.version, 3);

    let patch = |text| PatchEntryRequest {
        version: 3,
        patch: content(text),
    };
    let ok = api::patch_entry(&fixture.app, &author.principal(), entry.id, patch("v4"))
        .await
        .unwrap();
    assert_eq!(ok.status, 200);
    assert_eq!(ok.body.as_ref().unwrap().version, 4);

    let err = api::patch_entry(&fixture.app, &author.principal(), entry.id, patch("again"))
        .await
        .unwrap_err();
    assert_eq!(err.status, 409);
    assert!(err.message.contains("refresh and retry"));

    let stored = fixture.store.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 4);
    assert_eq!(stored.content_encrypted, Bytes::from_static(b"v4"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_advance_by_one() {
    let fixture = TestFixture::new();
    let author = fixture.user("author").await;
    let entry = fixture.private_entry(author.id).await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let app = Arc::clone(&fixture.app);
        let (id, user) = (entry.id, author.id);
        handles.push(tokio::spawn(async move {
            app.entries().update(id, user, 1, content("racing")).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(updated) => {
                assert_eq!(updated.version, 2);
                winners += 1;
            }
            Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(fixture.store.get_entry(entry.id).await.unwrap().unwrap().version, 2);
}

#[tokio::test]
async fn test_missing_or_foreign_entries_are_not_found() {
    let fixture = TestFixture::new();
    let author = fixture.user("author").await;
    let intruder = fixture.user("intruder").await;
    let entry = fixture.private_entry(author.id).await;

    let err = api::patch_entry(
        &fixture.app,
        &intruder.principal(),
        entry.id,
        PatchEntryRequest {
            version: 1,
            patch: content("mine now"),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 404);

    let err = api::patch_entry(
        &fixture.app,
        &author.principal(),
        innera_core::EntryId::new(),
        PatchEntryRequest {
            version: 1,
            patch: content("ghost"),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 404);
}

#[tokio::test]
async fn test_delete_and_restore_keep_version() {
    let fixture = TestFixture::new();
    let author = fixture.user("author").await;
    let entry = fixture.private_entry(author.id).await;
    let guard = fixture.app.entries();

    guard.soft_delete(author.id, entry.id).await.unwrap();
    let err = guard.get_for_viewer(author.id, entry.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = guard.update(entry.id, author.id, 1, content("x")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let restored = guard.restore(author.id, entry.id).await.unwrap();
    assert_eq!(restored.version, 1);
    assert!(restored.deleted_at.is_none());

    let err = guard.restore(author.id, entry.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_circle_admin_may_delete_members_entry() {
    let fixture = TestFixture::new();
    let owner = fixture.user("owner").await;
    let member = fixture.user("member").await;
    let bystander = fixture.user("bystander").await;
    let created = fixture
        .app
        .circles()
        .create_circle(owner.id, "writers", None)
        .await
        .unwrap();
    let circle = created.circle.id;
    for user in [&member, &bystander] {
        fixture
            .app
            .circles()
            .join_by_code(user.id, &created.invite.invite_code, HistoryPolicy::All)
            .await
            .unwrap();
    }
    let entry = fixture.entry(member.id, Visibility::Circle, Some(circle)).await;

    let err = fixture
        .app
        .entries()
        .soft_delete(bystander.id, entry.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    fixture.app.entries().soft_delete(owner.id, entry.id).await.unwrap();
    let err = fixture
        .app
        .entries()
        .restore(owner.id, entry.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_scope_changes_are_checked() {
    let fixture = TestFixture::new();
    let author = fixture.user("author").await;
    let other_owner = fixture.user("other").await;
    let entry = fixture.private_entry(author.id).await;
    let foreign = fixture.circle(other_owner.id, "not mine").await;
    let guard = fixture.app.entries();

    // Circle visibility without a circle
    let err = guard
        .update(
            entry.id,
            author.id,
            1,
            EntryPatch {
                visibility: Some(Visibility::Circle),
                ..EntryPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    // A circle the author does not belong to
    let err = guard
        .update(
            entry.id,
            author.id,
            1,
            EntryPatch {
                visibility: Some(Visibility::Circle),
                circle_id: Some(foreign),
                ..EntryPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // Nothing to change
    let err = guard
        .update(entry.id, author.id, 1, EntryPatch::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    // None of the failures moved the version
    assert_eq!(fixture.store.get_entry(entry.id).await.unwrap().unwrap().version, 1);
}
