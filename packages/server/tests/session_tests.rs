//! Sign-in and session actions against every session backend.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::*;
use jsonwebtoken::Algorithm;
use wallet_auth::config::AuthSettings;
use wallet_auth::domains::auth::actions::{check, refresh, signin, signout, SigninRequest};
use wallet_auth::domains::auth::signup_flow;
use wallet_auth::domains::sessions::{
    session_storage, Clock, MemorySessions, SessionError, SessionKind, SessionStorage,
    StatelessSessions,
};
use wallet_auth::kernel::{BaseKvStore, ServerDeps, TestDependencies};

fn test_with_kind(kind: SessionKind) -> TestDependencies {
    let test = TestDependencies::new();
    let auth = AuthSettings {
        session_kind: kind,
        jwt_secret: Some("session-test-secret".to_string()),
        retry_delay: None,
        ..AuthSettings::default()
    };
    let kv: Arc<dyn BaseKvStore> = Arc::new(test.kv.clone());
    let sessions = session_storage(&auth, kv).unwrap();
    test.with_auth(auth).with_sessions(sessions)
}

fn all_kinds() -> [SessionKind; 3] {
    [
        SessionKind::Mem,
        SessionKind::Stateless,
        SessionKind::StatelessRevocable,
    ]
}

async fn signed_in(deps: &ServerDeps) -> String {
    let request = SigninRequest {
        phone: PHONE.to_string(),
        password: PASSWORD.to_string(),
    };
    signin(&request, deps).await.unwrap().token
}

/// Clock that only moves when told to
fn manual_clock() -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
    let now = Arc::new(Mutex::new(Utc::now()));
    let handle = now.clone();
    (Arc::new(move || *handle.lock().unwrap()), now)
}

#[tokio::test]
async fn test_signin_check_refresh_on_every_backend() {
    for kind in all_kinds() {
        let test = test_with_kind(kind);
        seed_active_user(&test, PHONE, PASSWORD);
        let deps = test.server_deps();

        let token = signed_in(&deps).await;
        assert_eq!(check(&token, &deps).await.unwrap().phone.as_str(), PHONE, "{kind}");

        let fresh = refresh(&token, &deps).await.unwrap();
        assert_ne!(fresh.token, token, "{kind}");
        assert_eq!(
            check(&fresh.token, &deps).await.unwrap().phone.as_str(),
            PHONE,
            "{kind}"
        );
    }
}

#[tokio::test]
async fn test_signout_revokes_where_supported() {
    for kind in [SessionKind::Mem, SessionKind::StatelessRevocable] {
        let test = test_with_kind(kind);
        seed_active_user(&test, PHONE, PASSWORD);
        let deps = test.server_deps();
        let token = signed_in(&deps).await;

        signout(&token, &deps).await.unwrap();

        let err = check(&token, &deps).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED, "{kind}");
        // second sign-out of the same token still succeeds
        signout(&token, &deps).await.unwrap();
    }
}

#[tokio::test]
async fn test_stateless_signout_is_noop() {
    let test = test_with_kind(SessionKind::Stateless);
    seed_active_user(&test, PHONE, PASSWORD);
    let deps = test.server_deps();
    let token = signed_in(&deps).await;

    signout(&token, &deps).await.unwrap();

    assert!(check(&token, &deps).await.is_ok());
}

#[tokio::test]
async fn test_revocable_refresh_invalidates_old_token() {
    let test = test_with_kind(SessionKind::StatelessRevocable);
    seed_active_user(&test, PHONE, PASSWORD);
    let deps = test.server_deps();
    let token = signed_in(&deps).await;

    refresh(&token, &deps).await.unwrap();

    let err = check(&token, &deps).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_finish_session_works_with_jwt() {
    let test = test_with_kind(SessionKind::StatelessRevocable);
    let deps = test.server_deps();
    let flow = signup_flow(&deps);

    flow.start(&start(PHONE)).await.unwrap();
    flow.verify(&verify(PHONE, CODE)).await.unwrap();
    let session = flow.finish(&finish(PHONE, TOKEN, PASSWORD)).await.unwrap();

    assert_eq!(check(&session.token, &deps).await.unwrap().phone.as_str(), PHONE);
}

#[tokio::test]
async fn test_expired_session_reports_expired() {
    let ttl = Duration::from_secs(60);
    let (clock, now) = manual_clock();
    let backends: Vec<Arc<dyn SessionStorage>> = vec![
        Arc::new(MemorySessions::with_clock(clock.clone())),
        Arc::new(
            StatelessSessions::new("session-test-secret", Algorithm::HS256, None)
                .with_clock(clock.clone()),
        ),
    ];

    for sessions in backends {
        let claims = wallet_auth::domains::sessions::Claims {
            user_id: uuid::Uuid::now_v7(),
            phone: phone(PHONE),
        };
        let token = sessions.create(&claims, ttl).await.unwrap();
        assert_eq!(sessions.fetch(&token).await.unwrap(), claims);

        *now.lock().unwrap() += chrono::Duration::seconds(61);
        assert!(matches!(
            sessions.fetch(&token).await,
            Err(SessionError::Expired)
        ));
        *now.lock().unwrap() = Utc::now();
    }
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    for kind in all_kinds() {
        let test = test_with_kind(kind);
        let deps = test.server_deps();

        let err = check("garbage", &deps).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED, "{kind}");
    }
}
