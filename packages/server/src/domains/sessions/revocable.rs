use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::stateless::{StatelessSessions, TokenClaims};
use super::{Claims, SessionError, SessionStorage};
use crate::common::Phone;
use crate::kernel::{BaseKvStore, KvError};

/// Stateless sessions plus a key-value entry per issued token.
///
/// A token is only valid while `session:{sha256(phone)}:{jti}` exists, so
/// revoking deletes the entry. The entry expires together with the token.
pub struct RevocableSessions {
    inner: StatelessSessions,
    kv: Arc<dyn BaseKvStore>,
}

impl RevocableSessions {
    pub fn new(inner: StatelessSessions, kv: Arc<dyn BaseKvStore>) -> Self {
        Self { inner, kv }
    }

    fn key(phone: &Phone, jti: &str) -> String {
        format!("session:{}:{}", phone.hashed(), jti)
    }

    fn key_for(payload: &TokenClaims) -> Result<String, SessionError> {
        let jti = payload
            .jti
            .as_deref()
            .ok_or_else(|| SessionError::Malformed("missing jti".to_string()))?;
        Ok(Self::key(&payload.phone, jti))
    }
}

fn not_found(err: KvError) -> SessionError {
    match err {
        KvError::NotFound => SessionError::NotFound,
        other => SessionError::Storage(other),
    }
}

#[async_trait]
impl SessionStorage for RevocableSessions {
    async fn create(&self, claims: &Claims, ttl: Duration) -> Result<String, SessionError> {
        let jti = Uuid::new_v4().to_string();
        let token = self.inner.issue(claims, ttl, Some(jti.clone()))?;

        self.kv
            .set_with_expire(&Self::key(&claims.phone, &jti), &claims.user_id.to_string(), ttl)
            .await?;
        Ok(token)
    }

    async fn fetch(&self, token: &str) -> Result<Claims, SessionError> {
        let payload = self.inner.verify(token)?;
        self.kv
            .get(&Self::key_for(&payload)?)
            .await
            .map_err(not_found)?;
        Ok(payload.claims())
    }

    async fn refresh(&self, token: &str, ttl: Duration) -> Result<String, SessionError> {
        // the delete decides which of two concurrent refreshes wins
        let payload = self.inner.verify(token)?;
        self.kv
            .delete(&Self::key_for(&payload)?)
            .await
            .map_err(not_found)?;
        self.create(&payload.claims(), ttl).await
    }

    async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        let payload = self.inner.verify(token)?;
        self.kv
            .delete(&Self::key_for(&payload)?)
            .await
            .map_err(not_found)?;
        debug!(phone = %payload.phone, "session revoked");
        Ok(())
    }
}
