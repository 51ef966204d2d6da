use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{system_clock, to_chrono, Claims, Clock, SessionError, SessionStorage};
use crate::common::Phone;

/// JWT payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenClaims {
    pub sub: Uuid,
    pub phone: Phone,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl TokenClaims {
    pub fn claims(&self) -> Claims {
        Claims {
            user_id: self.sub,
            phone: self.phone.clone(),
        }
    }
}

/// Stateless sessions: everything lives in a signed JWT.
///
/// Expiry is checked against the injected clock, not by `jsonwebtoken`.
/// Tokens cannot be revoked before they expire.
#[derive(Clone)]
pub struct StatelessSessions {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: Option<String>,
    clock: Clock,
}

impl StatelessSessions {
    /// HMAC signer. `algorithm` must be one of the HS* family.
    pub fn new(secret: &str, algorithm: Algorithm, issuer: Option<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            issuer,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn issue(
        &self,
        claims: &Claims,
        ttl: Duration,
        jti: Option<String>,
    ) -> Result<String, SessionError> {
        let now = (self.clock)();
        let payload = TokenClaims {
            sub: claims.user_id,
            phone: claims.phone.clone(),
            iat: now.timestamp(),
            exp: (now + to_chrono(ttl)?).timestamp(),
            iss: self.issuer.clone(),
            jti,
        };

        encode(&Header::new(self.algorithm), &payload, &self.encoding_key)
            .map_err(|e| SessionError::Internal(e.to_string()))
    }

    /// Verify signature and issuer, then expiry
    pub(crate) fn verify(&self, token: &str) -> Result<TokenClaims, SessionError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let payload = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| SessionError::Malformed(e.to_string()))?
            .claims;

        if (self.clock)().timestamp() >= payload.exp {
            return Err(SessionError::Expired);
        }
        Ok(payload)
    }
}

#[async_trait]
impl SessionStorage for StatelessSessions {
    async fn create(&self, claims: &Claims, ttl: Duration) -> Result<String, SessionError> {
        self.issue(claims, ttl, Some(Uuid::new_v4().to_string()))
    }

    async fn fetch(&self, token: &str) -> Result<Claims, SessionError> {
        Ok(self.verify(token)?.claims())
    }

    /// Issues a new token; the old one stays valid until its own expiry
    async fn refresh(&self, token: &str, ttl: Duration) -> Result<String, SessionError> {
        let claims = self.fetch(token).await?;
        self.create(&claims, ttl).await
    }

    async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        let payload = self.verify(token)?;
        debug!(phone = %payload.phone, "stateless session cannot be revoked, ignoring");
        Ok(())
    }
}
