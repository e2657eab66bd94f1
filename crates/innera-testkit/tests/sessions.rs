//! Token issuance, rotation, and revocation through the request adapters.

use std::sync::Arc;

use innera::api::{self, LogoutRequest, RefreshRequest};
use innera::{InneraConfig, SqliteInnera};
use innera_core::User;
use innera_store::StoreExt;
use innera_testkit::{init_tracing, TestFixture};

#[tokio::test]
async fn test_refresh_rotates_and_returns_user() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let pair = fixture.app.tokens().issue_pair(&u1.principal()).await.unwrap();
    let old = fixture.app.tokens().verify_refresh(&pair.refresh_token).unwrap();

    let response = api::refresh(
        &fixture.app,
        RefreshRequest {
            refresh_token: pair.refresh_token.clone(),
        },
    )
    .await
    .unwrap();

    assert_eq!(response.status, 200);
    let body = response.body.unwrap();
    assert_eq!(body.expires_in, 900);
    assert_eq!(body.user, u1);
    assert_ne!(body.refresh_token, pair.refresh_token);

    // The old jti is gone, the new one is live
    let registry = fixture.app.tokens().registry();
    assert!(!registry.is_live(u1.id, &old.jti).await.unwrap());
    let new = fixture.app.tokens().verify_refresh(&body.refresh_token).unwrap();
    assert!(registry.is_live(u1.id, &new.jti).await.unwrap());

    let principal = fixture.app.authenticate(&body.access_token).unwrap();
    assert_eq!(principal.user_id, u1.id);
    assert_eq!(principal.email, u1.email);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_has_one_winner() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let pair = fixture.app.tokens().issue_pair(&u1.principal()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let app = Arc::clone(&fixture.app);
        let token = pair.refresh_token.clone();
        handles.push(tokio::spawn(async move {
            api::refresh(&app, RefreshRequest { refresh_token: token }).await
        }));
    }

    let mut ok = 0;
    let mut unauthorized = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(response) => {
                assert_eq!(response.status, 200);
                ok += 1;
            }
            Err(err) => {
                assert_eq!(err.status, 401);
                assert_eq!(err.code, "UNAUTHORIZED");
                unauthorized += 1;
            }
        }
    }
    assert_eq!((ok, unauthorized), (1, 1));
}

#[tokio::test]
async fn test_replayed_refresh_is_unauthorized() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let pair = fixture.app.tokens().issue_pair(&u1.principal()).await.unwrap();
    let request = || RefreshRequest {
        refresh_token: pair.refresh_token.clone(),
    };

    api::refresh(&fixture.app, request()).await.unwrap();
    let err = api::refresh(&fixture.app, request()).await.unwrap_err();
    assert_eq!(err.status, 401);
    assert!(err.correlation_id.is_none());
}

#[tokio::test]
async fn test_refresh_for_unknown_user_is_unauthorized() {
    let fixture = TestFixture::new();
    // Never inserted into the store
    let ghost = User::new("ghost@example.com", None, chrono::Utc::now());
    let pair = fixture.app.tokens().issue_pair(&ghost.principal()).await.unwrap();

    let err = api::refresh(
        &fixture.app,
        RefreshRequest {
            refresh_token: pair.refresh_token,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 401);
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let pair = fixture.app.tokens().issue_pair(&u1.principal()).await.unwrap();

    let err = api::refresh(
        &fixture.app,
        RefreshRequest {
            refresh_token: pair.access_token,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 401);
}

#[tokio::test]
async fn test_logout_revokes_only_that_token() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let phone = fixture.app.tokens().issue_pair(&u1.principal()).await.unwrap();
    let laptop = fixture.app.tokens().issue_pair(&u1.principal()).await.unwrap();

    let response = api::logout(
        &fixture.app,
        &u1.principal(),
        LogoutRequest {
            refresh_token: phone.refresh_token.clone(),
        },
    )
    .await
    .unwrap();
    assert_eq!(response.status, 204);
    assert!(response.body.is_none());

    let err = api::refresh(
        &fixture.app,
        RefreshRequest {
            refresh_token: phone.refresh_token,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 401);

    let still = api::refresh(
        &fixture.app,
        RefreshRequest {
            refresh_token: laptop.refresh_token,
        },
    )
    .await
    .unwrap();
    assert_eq!(still.status, 200);
}

#[tokio::test]
async fn test_logout_rejects_someone_elses_token() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let u2 = fixture.user("u2").await;
    let theirs = fixture.app.tokens().issue_pair(&u2.principal()).await.unwrap();

    let err = api::logout(
        &fixture.app,
        &u1.principal(),
        LogoutRequest {
            refresh_token: theirs.refresh_token.clone(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 401);

    let claims = fixture.app.tokens().verify_refresh(&theirs.refresh_token).unwrap();
    assert!(fixture
        .app
        .tokens()
        .registry()
        .is_live(u2.id, &claims.jti)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_logout_all_revokes_every_session() {
    let fixture = TestFixture::new();
    let u1 = fixture.user("u1").await;
    let u2 = fixture.user("u2").await;

    let mut mine = Vec::new();
    for _ in 0..5 {
        mine.push(fixture.app.tokens().issue_pair(&u1.principal()).await.unwrap());
    }
    let other = fixture.app.tokens().issue_pair(&u2.principal()).await.unwrap();

    let response = api::logout_all(&fixture.app, &u1.principal()).await.unwrap();
    assert_eq!(response.status, 204);

    for pair in mine {
        let err = api::refresh(
            &fixture.app,
            RefreshRequest {
                refresh_token: pair.refresh_token,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, 401);
    }
    api::refresh(
        &fixture.app,
        RefreshRequest {
            refresh_token: other.refresh_token,
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_sqlite_sessions_survive_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("innera.db");
    let config = InneraConfig::default().with_database_path(&path);
    let secret = config.secret.clone();

    let user;
    let pair;
    {
        let app = SqliteInnera::open(config).unwrap();
        user = User::new("u1@example.com", None, chrono::Utc::now());
        app.store().insert_user(user.clone()).await.unwrap();
        pair = app.tokens().issue_pair(&user.principal()).await.unwrap();
    }

    let app = SqliteInnera::open(
        InneraConfig::default()
            .with_secret(secret)
            .with_database_path(&path),
    )
    .unwrap();
    let response = api::refresh(
        &app,
        RefreshRequest {
            refresh_token: pair.refresh_token,
        },
    )
    .await
    .unwrap();
    assert_eq!(response.body.unwrap().user, user);
}
