//! Sign in with phone and password

use serde::Deserialize;
use tracing::info;

use crate::common::{FieldErrors, Phone};
use crate::domains::auth::TokenResponse;
use crate::domains::confirmation::requests::{PASSWORD_FIELD, PHONE_FIELD};
use crate::domains::confirmation::FlowError;
use crate::domains::sessions::Claims;
use crate::kernel::ServerDeps;

pub const INVALID_CREDENTIALS_MESSAGE: &str = "either phone or password are invalid";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SigninRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
}

/// Open a session for an active user whose password matches.
///
/// Unknown phone, inactive user and wrong password all produce the same error.
pub async fn signin(request: &SigninRequest, deps: &ServerDeps) -> Result<TokenResponse, FlowError> {
    let mut errors = FieldErrors::new();
    if request.phone.trim().is_empty() {
        errors.add(PHONE_FIELD, "phone is required");
    }
    if request.password.is_empty() {
        errors.add(PASSWORD_FIELD, "password is required");
    }
    errors.into_result()?;

    let invalid = || FlowError::field(PHONE_FIELD, INVALID_CREDENTIALS_MESSAGE);

    let phone = Phone::parse(&request.phone).map_err(|_| invalid())?;
    let user = match deps.users.find_by_phone(&phone).await? {
        Some(user) if user.is_active() && user.check_password(&request.password) => user,
        _ => {
            info!(phone = %phone, "sign-in rejected");
            return Err(invalid());
        }
    };

    let claims = Claims {
        user_id: user.id,
        phone: user.phone.clone(),
    };
    let token = deps.sessions.create(&claims, deps.auth.token_ttl).await?;

    info!(phone = %phone, user_id = %user.id, "signed in");
    Ok(TokenResponse { token })
}
