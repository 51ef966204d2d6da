use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use jsonwebtoken::Algorithm;
use tracing::info;

use super::{MemorySessions, RevocableSessions, SessionStorage, StatelessSessions};
use crate::config::AuthSettings;
use crate::kernel::BaseKvStore;

/// Which session backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionKind {
    #[default]
    Mem,
    Stateless,
    StatelessRevocable,
}

impl FromStr for SessionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mem" | "memory" => Ok(SessionKind::Mem),
            "stateless" | "jwt" => Ok(SessionKind::Stateless),
            "stateless+revocable" | "jwtpersistent" => Ok(SessionKind::StatelessRevocable),
            other => Err(anyhow!("unknown session storage '{}'", other)),
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionKind::Mem => "mem",
            SessionKind::Stateless => "stateless",
            SessionKind::StatelessRevocable => "stateless+revocable",
        };
        f.write_str(name)
    }
}

/// Parse a JWT signing method. Only HMAC methods are accepted.
pub fn parse_jwt_method(method: &str) -> Result<Algorithm> {
    let algorithm = Algorithm::from_str(method.trim())
        .map_err(|_| anyhow!("unknown jwt method '{}'", method))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => bail!("jwt method {:?} is not supported, use HS256, HS384 or HS512", other),
    }
}

/// Build the configured session storage
pub fn session_storage(
    settings: &AuthSettings,
    kv: Arc<dyn BaseKvStore>,
) -> Result<Arc<dyn SessionStorage>> {
    let storage: Arc<dyn SessionStorage> = match settings.session_kind {
        SessionKind::Mem => Arc::new(MemorySessions::new()),
        SessionKind::Stateless | SessionKind::StatelessRevocable => {
            let secret = settings
                .jwt_secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .context("JWT_SECRET must be set for stateless session storage")?;
            let stateless =
                StatelessSessions::new(secret, settings.jwt_algorithm, settings.jwt_issuer.clone());

            if settings.session_kind == SessionKind::StatelessRevocable {
                Arc::new(RevocableSessions::new(stateless, kv))
            } else {
                Arc::new(stateless)
            }
        }
    };

    info!(kind = %settings.session_kind, "session storage ready");
    Ok(storage)
}
