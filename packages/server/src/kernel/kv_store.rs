//! Key-value store errors, the in-memory backend and URI based selection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::redis_store::RedisKvStore;
use super::traits::BaseKvStore;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("key not found")]
    NotFound,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl KvError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Default minimum time between two sweeps of expired entries
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Entry>,
    next_sweep: Option<Instant>,
}

impl Entries {
    /// Drops every expired entry, at most once per `interval`
    fn sweep(&mut self, now: Instant, interval: Duration) {
        if self.next_sweep.is_some_and(|at| now < at) {
            return;
        }
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_live(now));
        self.next_sweep = Some(now + interval);

        let evicted = before - self.map.len();
        if evicted > 0 {
            debug!(evicted, "expired keys evicted");
        }
    }
}

/// In-process store. Expired entries read as absent, are dropped when a
/// lookup or delete finds them, and are swept on writes.
#[derive(Debug, Clone)]
pub struct MemoryKvStore {
    entries: Arc<RwLock<Entries>>,
    sweep_interval: Duration,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries::default())),
            sweep_interval,
        }
    }

    async fn insert(&self, key: &str, value: &str, expires_at: Option<Instant>) {
        let mut entries = self.entries.write().await;
        entries.sweep(Instant::now(), self.sweep_interval);
        entries.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseKvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<String, KvError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.map.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(entry.value.clone()),
                Some(_) => {}
                None => return Err(KvError::NotFound),
            }
        }

        // expired: drop it unless a writer replaced it meanwhile
        let mut entries = self.entries.write().await;
        if entries.map.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.map.remove(key);
        }
        Err(KvError::NotFound)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.insert(key, value, None).await;
        Ok(())
    }

    async fn set_with_expire(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), KvError> {
        self.insert(key, value, Some(Instant::now() + ttl)).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut entries = self.entries.write().await;
        match entries.map.remove(key) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(()),
            _ => Err(KvError::NotFound),
        }
    }
}

/// Build a store from a URI: `mem://`, `redis://host:port/db` or `rediss://...`
pub async fn kv_store_from_uri(uri: &str) -> Result<Arc<dyn BaseKvStore>> {
    let scheme = match uri.split_once("://") {
        Some((scheme, _)) => scheme,
        None => bail!("invalid storage uri '{}': missing scheme", uri),
    };

    match scheme {
        "mem" => {
            info!("Using in-memory key-value store");
            Ok(Arc::new(MemoryKvStore::new()))
        }
        "redis" | "rediss" => {
            let store = RedisKvStore::connect(uri).await?;
            info!("Connected to redis key-value store");
            Ok(Arc::new(store))
        }
        other => bail!("unsupported storage scheme '{}'", other),
    }
}
