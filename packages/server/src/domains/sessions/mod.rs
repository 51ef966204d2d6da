//! Session storage - issues and validates the credentials handed out on
//! sign-in and on signup completion.
//!
//! Three interchangeable backends sit behind [`SessionStorage`]:
//! - `mem`: opaque UUID handles in a process-local map
//! - `stateless`: self-contained signed JWTs, not revocable
//! - `stateless+revocable`: JWTs whose `jti` must also be present in the
//!   key-value store

pub mod factory;
pub mod memory;
pub mod revocable;
pub mod stateless;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::common::Phone;
use crate::kernel::KvError;

pub use factory::{session_storage, SessionKind};
pub use memory::MemorySessions;
pub use revocable::RevocableSessions;
pub use stateless::StatelessSessions;

/// What a session proves about its holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub phone: Phone,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("session not found")]
    NotFound,

    #[error("session expired")]
    Expired,

    #[error("session storage error: {0}")]
    Storage(#[from] KvError),

    #[error("session error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Failures the caller sees as a plain 401
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            SessionError::Malformed(_) | SessionError::NotFound | SessionError::Expired
        )
    }
}

/// Session storage contract.
///
/// `refresh` always rotates: the returned token is new, and the old one is
/// revoked where the backend can revoke.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn create(&self, claims: &Claims, ttl: Duration) -> Result<String, SessionError>;

    async fn fetch(&self, token: &str) -> Result<Claims, SessionError>;

    async fn refresh(&self, token: &str, ttl: Duration) -> Result<String, SessionError>;

    async fn revoke(&self, token: &str) -> Result<(), SessionError>;
}

/// Source of "now" for expiry checks
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

pub(crate) fn to_chrono(ttl: Duration) -> Result<chrono::Duration, SessionError> {
    chrono::Duration::from_std(ttl).map_err(|e| SessionError::Internal(e.to_string()))
}
