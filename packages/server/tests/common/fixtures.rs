//! Request builders and seeded users for integration tests.

use wallet_auth::common::{FieldError, Phone};
use wallet_auth::domains::auth::recovery::RECOVERY_TOKEN_FIELD;
use wallet_auth::domains::auth::signup::SIGNUP_TOKEN_FIELD;
use wallet_auth::domains::confirmation::{FinishRequest, FlowError, StartRequest, VerifyRequest};
use wallet_auth::domains::user::{Password, User};
use wallet_auth::kernel::TestDependencies;

pub const PHONE: &str = "+79871111111";
pub const CODE: &str = "556611";
pub const TOKEN: &str = "T";
pub const PASSWORD: &str = "pass123";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn phone(raw: &str) -> Phone {
    Phone::parse(raw).expect("valid test phone")
}

pub fn start(phone: &str) -> StartRequest {
    StartRequest {
        phone: phone.to_string(),
        referrer_phone: None,
    }
}

pub fn start_with_referrer(phone: &str, referrer: &str) -> StartRequest {
    StartRequest {
        phone: phone.to_string(),
        referrer_phone: Some(referrer.to_string()),
    }
}

pub fn verify(phone: &str, code: &str) -> VerifyRequest {
    VerifyRequest {
        phone: phone.to_string(),
        verification_code: code.to_string(),
    }
}

fn finish_with(phone: &str, token_field: &str, token: &str, password: &str) -> FinishRequest {
    FinishRequest {
        phone: phone.to_string(),
        password: password.to_string(),
        password_confirmation: password.to_string(),
        ..Default::default()
    }
    .with_token(token_field, token)
}

/// Signup finish body
pub fn finish(phone: &str, token: &str, password: &str) -> FinishRequest {
    finish_with(phone, SIGNUP_TOKEN_FIELD, token, password)
}

pub fn recovery_finish(phone: &str, token: &str, password: &str) -> FinishRequest {
    finish_with(phone, RECOVERY_TOKEN_FIELD, token, password)
}

/// Seeds an active user with `password`
pub fn seed_active_user(test: &TestDependencies, raw_phone: &str, password: &str) -> User {
    let mut user = User::new(phone(raw_phone), None);
    user.activate(Password::hash(password).expect("hash test password"));
    test.users.seed(user.clone());
    user
}

/// The single field error carried by `err`
pub fn only_field_error(err: &FlowError) -> FieldError {
    let fields = err
        .field_errors()
        .unwrap_or_else(|| panic!("expected field errors, got {err:?}"));
    assert_eq!(fields.len(), 1, "expected one field error, got {fields}");
    fields.iter().next().cloned().expect("one field error")
}
