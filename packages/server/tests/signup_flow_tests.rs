//! Signup flow through the public API with in-process stores.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use wallet_auth::config::AuthSettings;
use wallet_auth::domains::auth::signup::{
    signup_flow, REFERRER_NOT_FOUND_MESSAGE, USER_EXISTS_MESSAGE, USER_NOT_FOUND_MESSAGE,
};
use wallet_auth::domains::confirmation::FlowError;
use wallet_auth::domains::user::UserStatus;
use wallet_auth::kernel::test_dependencies::{FailingNotifier, RecordingNotifier};
use wallet_auth::kernel::{BaseKvStore, NotificationAction, TestDependencies};

const CODE_KEY: &str = "user:+79871111111:signup:code";
const TOKEN_KEY: &str = "user:+79871111111:signup:token";

#[tokio::test]
async fn test_signup_round_trip() {
    init_tracing();
    let test = TestDependencies::new();
    let deps = test.server_deps();
    let flow = signup_flow(&deps);

    flow.start(&start(PHONE)).await.unwrap();
    assert_eq!(test.notifier.last_code(&phone(PHONE)).as_deref(), Some(CODE));
    assert_eq!(test.users.get(&phone(PHONE)).unwrap().status, UserStatus::Pending);

    let token = flow.verify(&verify(PHONE, CODE)).await.unwrap();
    assert_eq!(token.token, TOKEN);
    assert_eq!(token.field, "signup_token");
    assert_eq!(test.users.get(&phone(PHONE)).unwrap().status, UserStatus::Verified);

    let session = flow.finish(&finish(PHONE, TOKEN, PASSWORD)).await.unwrap();

    let user = test.users.get(&phone(PHONE)).unwrap();
    assert_eq!(user.status, UserStatus::Active);
    assert!(user.registered_at.is_some());
    assert!(user.check_password(PASSWORD));

    let claims = deps.sessions.fetch(&session.token).await.unwrap();
    assert_eq!(claims.user_id, user.id);

    assert_eq!(test.kv.get_optional(CODE_KEY).await.unwrap(), None);
    assert_eq!(test.kv.get_optional(TOKEN_KEY).await.unwrap(), None);

    let actions: Vec<_> = test
        .notifier
        .sent()
        .into_iter()
        .map(|s| s.notification.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            NotificationAction::RegistrationConfirmationRequested,
            NotificationAction::RegistrationCompleted,
        ]
    );
}

#[tokio::test]
async fn test_verify_never_issued_code() {
    let test = TestDependencies::new();
    let mut user = wallet_auth::domains::user::User::new(phone(PHONE), None);
    user.set_status(UserStatus::Pending);
    test.users.seed(user);
    let flow = signup_flow(&test.server_deps());

    let err = flow.verify(&verify(PHONE, CODE)).await.unwrap_err();

    let field = only_field_error(&err);
    assert_eq!(field.name, "verification_code");
    assert_eq!(field.message, "code is wrong");
    assert_eq!(test.users.get(&phone(PHONE)).unwrap().status, UserStatus::Pending);
}

#[tokio::test]
async fn test_wrong_code_keeps_code() {
    let test = TestDependencies::new();
    let flow = signup_flow(&test.server_deps());
    flow.start(&start(PHONE)).await.unwrap();

    let err = flow.verify(&verify(PHONE, "000000")).await.unwrap_err();
    assert_eq!(only_field_error(&err).message, "code is wrong");
    assert_eq!(test.kv.get_optional(CODE_KEY).await.unwrap().as_deref(), Some(CODE));
    assert_eq!(test.users.get(&phone(PHONE)).unwrap().status, UserStatus::Pending);

    flow.verify(&verify(PHONE, CODE)).await.unwrap();
    assert_eq!(test.kv.get_optional(CODE_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_finish_before_verify_without_token() {
    let test = TestDependencies::new();
    let flow = signup_flow(&test.server_deps());
    flow.start(&start(PHONE)).await.unwrap();

    let err = flow.finish(&finish(PHONE, TOKEN, PASSWORD)).await.unwrap_err();

    let field = only_field_error(&err);
    assert_eq!(field.name, "signup_token");
    assert_eq!(field.message, "signup_token is wrong");
    let user = test.users.get(&phone(PHONE)).unwrap();
    assert_eq!(user.status, UserStatus::Pending);
    assert!(user.password.is_none());
}

#[tokio::test]
async fn test_finish_before_verify_with_planted_token() {
    let test = TestDependencies::new();
    let flow = signup_flow(&test.server_deps());
    flow.start(&start(PHONE)).await.unwrap();
    test.kv.set(TOKEN_KEY, TOKEN).await.unwrap();

    let err = flow.finish(&finish(PHONE, TOKEN, PASSWORD)).await.unwrap_err();

    assert!(matches!(err, FlowError::NotAllowed));
    let user = test.users.get(&phone(PHONE)).unwrap();
    assert_eq!(user.status, UserStatus::Pending);
    assert!(user.password.is_none());
}

#[tokio::test]
async fn test_concurrent_start_creates_one_user() {
    let notifier = RecordingNotifier::new().with_delay(Duration::from_millis(50));
    let test = TestDependencies::new().with_notifier(notifier);
    let flow = Arc::new(signup_flow(&test.server_deps()));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let flow = flow.clone();
            tokio::spawn(async move { flow.start(&start(PHONE)).await })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(err) => assert_eq!(only_field_error(&err).message, USER_EXISTS_MESSAGE),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(test.users.count(), 1);
}

#[tokio::test]
async fn test_notification_failure_rolls_back() {
    let test = TestDependencies::new();
    let notifier = FailingNotifier::new();
    let flow = signup_flow(&test.server_deps_with_notifier(Arc::new(notifier.clone())));

    let err = flow.start(&start(PHONE)).await.unwrap_err();

    assert!(matches!(err, FlowError::Notify(_)));
    assert!(err.is_internal());
    assert_eq!(notifier.attempts(), 1);
    assert_eq!(test.users.count(), 0);
    assert_eq!(test.kv.get_optional(CODE_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_restart_issues_fresh_code() {
    let test = TestDependencies::new();
    test.generator.push_code("111111");
    let flow = signup_flow(&test.server_deps());

    flow.start(&start(PHONE)).await.unwrap();
    flow.start(&start(PHONE)).await.unwrap();

    let err = flow.verify(&verify(PHONE, "111111")).await.unwrap_err();
    assert_eq!(only_field_error(&err).name, "verification_code");
    flow.verify(&verify(PHONE, CODE)).await.unwrap();
}

#[tokio::test]
async fn test_resend_throttle() {
    let test = TestDependencies::new().with_auth(AuthSettings {
        retry_delay: Some(Duration::from_secs(60)),
        ..AuthSettings::default()
    });
    let flow = signup_flow(&test.server_deps());

    flow.start(&start(PHONE)).await.unwrap();
    let err = flow.start(&start(PHONE)).await.unwrap_err();

    let field = only_field_error(&err);
    assert_eq!(field.name, "phone");
    assert_eq!(field.message, "verification code already sent, retry later");
    assert_eq!(test.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_start_refuses_active_user() {
    let test = TestDependencies::new();
    seed_active_user(&test, PHONE, PASSWORD);
    let flow = signup_flow(&test.server_deps());

    let err = flow.start(&start(PHONE)).await.unwrap_err();

    assert_eq!(only_field_error(&err).message, USER_EXISTS_MESSAGE);
    assert!(test.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_referrer_must_be_active() {
    let test = TestDependencies::new();
    let flow = signup_flow(&test.server_deps());

    let err = flow
        .start(&start_with_referrer(PHONE, "+79875555555"))
        .await
        .unwrap_err();
    let field = only_field_error(&err);
    assert_eq!(field.name, "referrer_phone");
    assert_eq!(field.message, REFERRER_NOT_FOUND_MESSAGE);
    assert_eq!(test.users.count(), 0);

    let referrer = seed_active_user(&test, "+79875555555", PASSWORD);
    flow.start(&start_with_referrer(PHONE, "+79875555555"))
        .await
        .unwrap();
    assert_eq!(test.users.get(&phone(PHONE)).unwrap().referrer_id, Some(referrer.id));
}

#[tokio::test]
async fn test_validation_errors_are_enriched() {
    let test = TestDependencies::new();
    seed_active_user(&test, PHONE, PASSWORD);
    let flow = signup_flow(&test.server_deps());

    // Bad referrer format plus an existing phone
    let err = flow
        .start(&start_with_referrer(PHONE, "nope"))
        .await
        .unwrap_err();
    let fields = err.field_errors().unwrap();
    assert!(fields.has_field("referrer_phone"));
    assert!(fields
        .iter()
        .any(|f| f.name == "phone" && f.message == USER_EXISTS_MESSAGE));

    // Empty code for an unknown phone
    let err = flow.verify(&verify("+79879999999", "")).await.unwrap_err();
    let fields = err.field_errors().unwrap();
    assert!(fields.has_field("verification_code"));
    assert!(fields
        .iter()
        .any(|f| f.name == "phone" && f.message == USER_NOT_FOUND_MESSAGE));
}

#[tokio::test]
async fn test_finish_validates_password() {
    let test = TestDependencies::new();
    let flow = signup_flow(&test.server_deps());
    flow.start(&start(PHONE)).await.unwrap();
    flow.verify(&verify(PHONE, CODE)).await.unwrap();

    let mut request = finish(PHONE, TOKEN, PASSWORD);
    request.password_confirmation = "other1".to_string();
    let err = flow.finish(&request).await.unwrap_err();

    assert!(err.field_errors().unwrap().has_field("password_confirmation"));
    assert_eq!(test.users.get(&phone(PHONE)).unwrap().status, UserStatus::Verified);
    assert!(test.kv.get_optional(TOKEN_KEY).await.unwrap().is_some());
}
