use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use tracing::debug;

use super::{StoreError, UserDb, UserTx};
use crate::common::Phone;
use crate::domains::user::{NewUser, User};

/// User store backed by Postgres
#[derive(Clone)]
pub struct PostgresUserDb {
    pool: PgPool,
}

impl PostgresUserDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDb for PostgresUserDb {
    async fn begin(&self) -> Result<Box<dyn UserTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUserTx { tx }))
    }

    async fn find_by_phone(&self, phone: &Phone) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(User::find_by_phone(phone, false, &mut conn).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct PostgresUserTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UserTx for PostgresUserTx {
    async fn find_by_phone(
        &mut self,
        phone: &Phone,
        lock: bool,
    ) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_phone(phone, lock, &mut self.tx).await?)
    }

    async fn create(&mut self, new_user: NewUser) -> Result<User, StoreError> {
        let referrer = match &new_user.referrer_phone {
            Some(referrer_phone) => {
                match User::find_by_phone(referrer_phone, false, &mut self.tx).await? {
                    Some(referrer) if referrer.is_active() => Some(referrer),
                    _ => return Err(StoreError::ReferrerNotFound),
                }
            }
            None => None,
        };

        let user = User::new(new_user.phone, referrer.as_ref());
        let created = user
            .insert(&mut self.tx)
            .await
            .map_err(StoreError::from_insert)?;

        debug!(phone = %created.phone, user_id = %created.id, "user row inserted");
        Ok(created)
    }

    async fn update(&mut self, user: &User) -> Result<(), StoreError> {
        Ok(user.update(&mut self.tx).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.commit().await?)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.rollback().await?)
    }
}
