//! Partner pairing under contention.

use std::collections::HashSet;
use std::sync::Arc;

use innera::api;
use innera_core::{LinkRole, LinkStatus, NotificationKind, UserId};
use innera_store::{Store, StoreExt};
use innera_testkit::TestFixture;

/// Every PENDING or ACTIVE link touching `user`.
async fn open_links(fixture: &TestFixture, user: UserId) -> usize {
    fixture
        .store
        .transaction(move |tx| {
            let link = tx.open_link_for(user)?;
            Ok::<_, innera_store::StoreError>(link.into_iter().count())
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_invite_accept_then_code_is_gone() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let u2 = fixture.user("u2").await;

    let created = api::create_partner_invite(&fixture.app, &u1.principal()).await.unwrap();
    assert_eq!(created.status, 201);
    let invite = created.body.unwrap();
    assert_eq!(invite.expires_in, 24 * 60 * 60);

    let accepted = api::accept_partner_invite(&fixture.app, &u2.principal(), &invite.invite_code)
        .await
        .unwrap();
    assert_eq!(accepted.status, 200);
    assert_eq!(accepted.body.as_ref().unwrap().status, LinkStatus::Active);

    let link = fixture.store.open_link_for(u1.id).await.unwrap().unwrap();
    assert_eq!(link.initiator_id, u1.id);
    assert_eq!(link.partner_id, u2.id);
    assert_eq!(link.status, LinkStatus::Active);

    let u3 = fixture.user("u3").await;
    let err = api::accept_partner_invite(&fixture.app, &u3.principal(), &invite.invite_code)
        .await
        .unwrap_err();
    assert_eq!(err.status, 404);

    let seen = fixture.notifier.wait_for(1).await;
    assert_eq!(seen[0].kind, NotificationKind::PartnerAccepted);
    assert_eq!(seen[0].user_id, u1.id);
}

#[tokio::test]
async fn test_partner_view_from_both_sides() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let u2 = fixture.user("u2").await;

    let none = api::current_partner(&fixture.app, &u1.principal()).await.unwrap();
    assert_eq!(none.body, Some(None));

    let invite = fixture.app.pairing().create_invite(u1.id).await.unwrap();
    fixture
        .app
        .pairing()
        .accept_invite(u2.id, &invite.invite_code)
        .await
        .unwrap();

    let mine = fixture.app.pairing().current(u1.id).await.unwrap().unwrap();
    assert_eq!(mine.role, LinkRole::Initiator);
    assert_eq!(mine.partner_id, u2.id);
    let theirs = fixture.app.pairing().current(u2.id).await.unwrap().unwrap();
    assert_eq!(theirs.role, LinkRole::Partner);
    assert_eq!(theirs.partner_id, u1.id);
    assert_eq!(mine.id, theirs.id);
}

#[tokio::test]
async fn test_second_invite_conflicts_while_outstanding() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;

    api::create_partner_invite(&fixture.app, &u1.principal()).await.unwrap();
    let err = api::create_partner_invite(&fixture.app, &u1.principal()).await.unwrap_err();
    assert_eq!(err.status, 409);
    assert!(err.message.contains("retry"));
}

#[tokio::test]
async fn test_linked_user_cannot_invite_or_accept() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let u2 = fixture.user("u2").await;
    let u3 = fixture.user("u3").await;

    let invite = fixture.app.pairing().create_invite(u1.id).await.unwrap();
    fixture
        .app
        .pairing()
        .accept_invite(u2.id, &invite.invite_code)
        .await
        .unwrap();

    let err = api::create_partner_invite(&fixture.app, &u2.principal()).await.unwrap_err();
    assert_eq!(err.status, 409);

    let open = fixture.app.pairing().create_invite(u3.id).await.unwrap();
    let err = api::accept_partner_invite(&fixture.app, &u2.principal(), &open.invite_code)
        .await
        .unwrap_err();
    assert_eq!(err.status, 409);

    // u3's code survives the failed acceptance
    fixture
        .app
        .pairing()
        .accept_invite(fixture.user("u4").await.id, &open.invite_code)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_self_accept_is_bad_request() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let invite = fixture.app.pairing().create_invite(u1.id).await.unwrap();

    let err = api::accept_partner_invite(&fixture.app, &u1.principal(), &invite.invite_code)
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(open_links(&fixture, u1.id).await, 0);
}

#[tokio::test]
async fn test_revoke_then_pair_again() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let u2 = fixture.user("u2").await;

    let invite = fixture.app.pairing().create_invite(u1.id).await.unwrap();
    fixture
        .app
        .pairing()
        .accept_invite(u2.id, &invite.invite_code)
        .await
        .unwrap();

    let revoked = fixture.app.pairing().revoke(u2.id).await.unwrap();
    assert_eq!(revoked.status, LinkStatus::Revoked);
    assert_eq!(revoked.revoked_by, Some(u2.id));
    assert!(fixture.app.pairing().current(u1.id).await.unwrap().is_none());

    let err = fixture.app.pairing().revoke(u2.id).await.unwrap_err();
    assert_eq!(err.kind(), innera_core::ErrorKind::NotFound);

    let again = fixture.app.pairing().create_invite(u2.id).await.unwrap();
    fixture
        .app
        .pairing()
        .accept_invite(u1.id, &again.invite_code)
        .await
        .unwrap();

    let revocations = fixture.notifier.of_kind(NotificationKind::PartnerRevoked);
    assert_eq!(revocations.len(), 1);
    assert_eq!(revocations[0].user_id, u1.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pairing_never_double_links() {
    let fixture = TestFixture::new();
    let mut users = Vec::new();
    for i in 0..8 {
        users.push(fixture.user(&format!("u{}", i)).await);
    }

    // Half the users invite, everyone races to accept every code
    let mut codes = Vec::new();
    for inviter in &users[..4] {
        codes.push(
            fixture
                .app
                .pairing()
                .create_invite(inviter.id)
                .await
                .unwrap()
                .invite_code,
        );
    }

    let mut handles = Vec::new();
    for user in &users {
        for code in &codes {
            let app = Arc::clone(&fixture.app);
            let code = code.clone();
            let user = user.id;
            handles.push(tokio::spawn(async move {
                app.pairing().accept_invite(user, &code).await
            }));
        }
    }

    let mut linked = Vec::new();
    for handle in handles {
        if let Ok(link) = handle.await.unwrap() {
            linked.push(link);
        }
    }

    // Each code is redeemed at most once, each user sits in at most one link
    let mut participants = HashSet::new();
    for link in &linked {
        assert!(participants.insert(link.initiator_id));
        assert!(participants.insert(link.partner_id));
    }
    for user in &users {
        assert!(open_links(&fixture, user.id).await <= 1);
    }
    assert!(!linked.is_empty());
    assert!(linked.len() <= codes.len());
}
