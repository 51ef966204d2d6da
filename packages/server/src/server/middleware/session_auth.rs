use std::sync::Arc;

use axum::{
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::domains::confirmation::FlowError;
use crate::domains::sessions::{Claims, SessionError};
use crate::kernel::ServerDeps;

/// Session owner attached to authenticated requests
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub claims: Claims,
    pub token: String,
}

/// Session authentication middleware
///
/// Reads `Authorization: <token_name> <token>`, fetches the session and adds
/// [`AuthUser`] to request extensions. Any failure ends the request with 401.
pub async fn session_auth_middleware(
    deps: Arc<ServerDeps>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers(), &deps.auth.token_name) else {
        debug!("No session token");
        return unauthorized();
    };

    match deps.sessions.fetch(&token).await {
        Ok(claims) => {
            debug!(user_id = %claims.user_id, "Authenticated session");
            request.extensions_mut().insert(AuthUser { claims, token });
            next.run(request).await
        }
        Err(e) => {
            if e.is_unauthorized() {
                debug!(reason = %e, "Session rejected");
            } else {
                warn!(error = %e, "Session lookup failed");
            }
            unauthorized()
        }
    }
}

/// Token from an `Authorization` header using the configured scheme name
pub fn extract_token(headers: &HeaderMap, token_name: &str) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(token_name) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub fn unauthorized() -> Response {
    FlowError::Session(SessionError::NotFound).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn test_extract_token_with_scheme() {
        assert_eq!(
            extract_token(&headers("Bearer abc"), "Bearer"),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_token(&headers("bearer abc"), "Bearer"),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_extract_token_custom_name() {
        assert_eq!(
            extract_token(&headers("Wallet xyz"), "Wallet"),
            Some("xyz".to_string())
        );
        assert_eq!(extract_token(&headers("Bearer xyz"), "Wallet"), None);
    }

    #[test]
    fn test_extract_token_rejects_bare_or_empty() {
        assert_eq!(extract_token(&headers("abc"), "Bearer"), None);
        assert_eq!(extract_token(&headers("Bearer  "), "Bearer"), None);
        assert_eq!(extract_token(&HeaderMap::new(), "Bearer"), None);
    }
}
