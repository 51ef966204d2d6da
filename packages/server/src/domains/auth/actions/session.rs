//! Sign-out, refresh and check of an existing session

use serde::Serialize;
use tracing::{debug, info};

use crate::common::Phone;
use crate::domains::auth::TokenResponse;
use crate::domains::confirmation::FlowError;
use crate::domains::sessions::{Claims, SessionError};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResponse {
    pub phone: Phone,
}

/// Revoke the session. Sessions that are already gone count as success.
pub async fn signout(token: &str, deps: &ServerDeps) -> Result<(), FlowError> {
    match deps.sessions.revoke(token).await {
        Ok(()) => {
            info!("signed out");
            Ok(())
        }
        Err(e @ (SessionError::NotFound | SessionError::Expired)) => {
            debug!(reason = %e, "sign-out of a dead session");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Swap the session for a new one
pub async fn refresh(token: &str, deps: &ServerDeps) -> Result<TokenResponse, FlowError> {
    let token = deps.sessions.refresh(token, deps.auth.token_ttl).await?;
    Ok(TokenResponse { token })
}

/// Phone of the session owner
pub async fn check(token: &str, deps: &ServerDeps) -> Result<CheckResponse, FlowError> {
    let Claims { phone, .. } = deps.sessions.fetch(token).await?;
    Ok(CheckResponse { phone })
}
