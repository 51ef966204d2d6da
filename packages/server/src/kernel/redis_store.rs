//! Redis backed key-value store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::kv_store::KvError;
use super::traits::BaseKvStore;

/// Store using a shared, auto-reconnecting redis connection
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl BaseKvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<String, KvError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        value.ok_or(KvError::NotFound)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_with_expire(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        // PSETEX rejects zero
        let millis = (ttl.as_millis() as u64).max(1);
        conn.pset_ex::<_, _, ()>(key, value, millis).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        if removed == 0 {
            return Err(KvError::NotFound);
        }
        Ok(())
    }
}
