//! Request bodies of the three steps and their validation.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::common::{FieldErrors, Phone, PhoneError};

pub const PHONE_FIELD: &str = "phone";
pub const REFERRER_PHONE_FIELD: &str = "referrer_phone";
pub const CODE_FIELD: &str = "verification_code";
pub const PASSWORD_FIELD: &str = "password";
pub const PASSWORD_CONFIRMATION_FIELD: &str = "password_confirmation";

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub referrer_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub verification_code: String,
}

/// The token travels under a flow specific name (`signup_token`,
/// `recovery_token`), so it is kept with the other unnamed fields and
/// picked out by the flow at validation time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinishRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartInput {
    pub phone: Phone,
    pub referrer_phone: Option<Phone>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyInput {
    pub phone: Phone,
    pub code: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct FinishInput {
    pub phone: Phone,
    pub token: String,
    pub password: String,
}

// Keep secrets out of logs
impl std::fmt::Debug for FinishInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishInput")
            .field("phone", &self.phone)
            .finish_non_exhaustive()
    }
}

fn check_phone(errors: &mut FieldErrors, field: &str, raw: &str) -> Option<Phone> {
    match Phone::parse(raw) {
        Ok(phone) => Some(phone),
        Err(PhoneError::Empty) => {
            errors.add(field, format!("{} is required", field));
            None
        }
        Err(e) => {
            errors.add(field, format!("{} is invalid: {}", field, e));
            None
        }
    }
}

fn check_required(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, format!("{} is required", field));
    }
}

fn complete<T>(
    errors: FieldErrors,
    phone: Option<Phone>,
    build: impl FnOnce(Phone) -> T,
) -> Result<T, FieldErrors> {
    errors.into_result()?;
    // a missing phone always leaves an error behind
    phone.map(build).ok_or_else(FieldErrors::new)
}

/// Password rules shared by signup and recovery
pub fn check_password(errors: &mut FieldErrors, password: &str, confirmation: &str) {
    if password.is_empty() {
        errors.add(PASSWORD_FIELD, "password is required");
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            PASSWORD_FIELD,
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    } else if !password.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.add(PASSWORD_FIELD, "password must contain only letters and digits");
    }

    if confirmation.is_empty() {
        errors.add(PASSWORD_CONFIRMATION_FIELD, "password_confirmation is required");
    } else if confirmation != password {
        errors.add(
            PASSWORD_CONFIRMATION_FIELD,
            "password_confirmation must match password",
        );
    }
}

impl StartRequest {
    pub fn validate(&self) -> Result<StartInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let phone = check_phone(&mut errors, PHONE_FIELD, &self.phone);
        let referrer_phone = match self.referrer_phone.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => check_phone(&mut errors, REFERRER_PHONE_FIELD, raw),
        };

        complete(errors, phone, |phone| StartInput {
            phone,
            referrer_phone,
        })
    }
}

impl VerifyRequest {
    pub fn validate(&self) -> Result<VerifyInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let phone = check_phone(&mut errors, PHONE_FIELD, &self.phone);
        check_required(&mut errors, CODE_FIELD, &self.verification_code);

        complete(errors, phone, |phone| VerifyInput {
            phone,
            code: self.verification_code.trim().to_string(),
        })
    }
}

impl FinishRequest {
    pub fn with_token(mut self, token_field: &str, token: impl Into<String>) -> Self {
        self.fields
            .insert(token_field.to_string(), Value::String(token.into()));
        self
    }

    /// The token sent under `token_field`; anything else reads as absent
    pub fn token(&self, token_field: &str) -> &str {
        self.fields
            .get(token_field)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// `token_field` is the name the token travels under in this flow
    pub fn validate(&self, token_field: &str) -> Result<FinishInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let phone = check_phone(&mut errors, PHONE_FIELD, &self.phone);
        let token = self.token(token_field);
        check_required(&mut errors, token_field, token);
        check_password(&mut errors, &self.password, &self.password_confirmation);

        complete(errors, phone, |phone| FinishInput {
            phone,
            token: token.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

/// A raw request as received, before validation
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    Start(&'a StartRequest),
    Verify(&'a VerifyRequest),
    Finish(&'a FinishRequest),
}

impl Request<'_> {
    pub fn raw_phone(&self) -> &str {
        match self {
            Request::Start(r) => &r.phone,
            Request::Verify(r) => &r.phone,
            Request::Finish(r) => &r.phone,
        }
    }
}

/// A validated request, handed to the flow hooks
#[derive(Debug, Clone, Copy)]
pub enum Step<'a> {
    Start(&'a StartInput),
    Verify(&'a VerifyInput),
    Finish(&'a FinishInput),
}

impl Step<'_> {
    pub fn phone(&self) -> &Phone {
        match self {
            Step::Start(input) => &input.phone,
            Step::Verify(input) => &input.phone,
            Step::Finish(input) => &input.phone,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Start(_) => "start",
            Step::Verify(_) => "verify",
            Step::Finish(_) => "finish",
        }
    }
}
