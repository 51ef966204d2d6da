use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{system_clock, to_chrono, Claims, Clock, SessionError, SessionStorage};

#[derive(Clone, Debug)]
struct Session {
    claims: Claims,
    created_at: DateTime<Utc>,
    expire_at: DateTime<Utc>,
}

/// How long an expired session is kept so lookups report `Expired`
pub const EXPIRED_GRACE: Duration = Duration::from_secs(60 * 60);

/// Minimum time between two sweeps of dead sessions
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Sessions {
    by_id: HashMap<Uuid, Session>,
    next_sweep: Option<DateTime<Utc>>,
}

impl Sessions {
    /// Drops sessions past expiry plus grace, at most once per interval
    fn sweep(
        &mut self,
        now: DateTime<Utc>,
        grace: chrono::Duration,
        interval: chrono::Duration,
    ) {
        if self.next_sweep.is_some_and(|at| now < at) {
            return;
        }
        let before = self.by_id.len();
        self.by_id.retain(|_, session| now < session.expire_at + grace);
        self.next_sweep = Some(now + interval);

        let evicted = before - self.by_id.len();
        if evicted > 0 {
            debug!(evicted, "expired sessions evicted");
        }
    }
}

/// In-memory session store.
///
/// Expired sessions are kept for [`EXPIRED_GRACE`] so a late lookup reports
/// `Expired` rather than `NotFound`, then evicted. Lost on restart.
#[derive(Clone)]
pub struct MemorySessions {
    sessions: Arc<RwLock<Sessions>>,
    clock: Clock,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Sessions::default())),
            clock,
        }
    }

    fn parse(token: &str) -> Result<Uuid, SessionError> {
        Uuid::parse_str(token).map_err(|e| SessionError::Malformed(e.to_string()))
    }
}

impl Default for MemorySessions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for MemorySessions {
    async fn create(&self, claims: &Claims, ttl: Duration) -> Result<String, SessionError> {
        let now = (self.clock)();
        let id = Uuid::new_v4();
        let session = Session {
            claims: claims.clone(),
            created_at: now,
            expire_at: now + to_chrono(ttl)?,
        };

        let mut sessions = self.sessions.write().await;
        sessions.sweep(now, to_chrono(EXPIRED_GRACE)?, to_chrono(SWEEP_INTERVAL)?);
        sessions.by_id.insert(id, session);
        drop(sessions);

        debug!(phone = %claims.phone, "session created");
        Ok(id.to_string())
    }

    async fn fetch(&self, token: &str) -> Result<Claims, SessionError> {
        let id = Self::parse(token)?;
        let sessions = self.sessions.read().await;
        let session = sessions.by_id.get(&id).ok_or(SessionError::NotFound)?;

        if (self.clock)() >= session.expire_at {
            return Err(SessionError::Expired);
        }
        Ok(session.claims.clone())
    }

    async fn refresh(&self, token: &str, ttl: Duration) -> Result<String, SessionError> {
        let claims = self.fetch(token).await?;
        let fresh = self.create(&claims, ttl).await?;
        self.sessions.write().await.by_id.remove(&Self::parse(token)?);
        Ok(fresh)
    }

    async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        let id = Self::parse(token)?;
        let removed = self.sessions.write().await.by_id.remove(&id);
        match removed {
            None => Err(SessionError::NotFound),
            Some(session) if (self.clock)() >= session.expire_at => Err(SessionError::Expired),
            Some(session) => {
                debug!(
                    phone = %session.claims.phone,
                    created_at = %session.created_at,
                    "session revoked"
                );
                Ok(())
            }
        }
    }
}
