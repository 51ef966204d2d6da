//! Transactional entity store: contracts, the transaction finaliser and the
//! Postgres and in-process implementations.

pub mod memory;
pub mod postgres;
pub mod tx;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::common::Phone;
use crate::domains::user::{NewUser, User};

pub use memory::MemoryUserDb;
pub use postgres::PostgresUserDb;
pub use tx::{settle, PanicRollbackError, TxError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("user already exists")]
    AlreadyExists,

    #[error("referrer not found")]
    ReferrerNotFound,

    #[error("row for {0} is not locked by this transaction")]
    NotLocked(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map unique constraint violations to `AlreadyExists`
    pub fn from_insert(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists,
            _ => StoreError::Database(err),
        }
    }
}

/// A unit of work that ends in exactly one of commit or rollback
#[async_trait]
pub trait Transaction: Send + 'static {
    async fn commit(self) -> Result<(), StoreError>;
    async fn rollback(self) -> Result<(), StoreError>;
}

/// Something that opens transactions
#[async_trait]
pub trait TxStore: Send + Sync {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

// =============================================================================
// User store contracts
// =============================================================================

#[async_trait]
pub trait UserDb: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UserTx>, StoreError>;

    /// Read outside of any transaction, no locking
    async fn find_by_phone(&self, phone: &Phone) -> Result<Option<User>, StoreError>;

    /// Cheap liveness check for health reporting
    async fn ping(&self) -> Result<(), StoreError>;
}

/// User queries inside one transaction. Dropping without commit rolls back.
#[async_trait]
pub trait UserTx: Send {
    /// With `lock`, an existing row stays locked until the transaction ends
    async fn find_by_phone(&mut self, phone: &Phone, lock: bool)
        -> Result<Option<User>, StoreError>;

    /// Insert a `created` user. The referrer, when given, must be an active user.
    async fn create(&mut self, new_user: NewUser) -> Result<User, StoreError>;

    /// Persist a user whose row this transaction has locked
    async fn update(&mut self, user: &User) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl Transaction for Box<dyn UserTx> {
    async fn commit(self) -> Result<(), StoreError> {
        UserTx::commit(self).await
    }

    async fn rollback(self) -> Result<(), StoreError> {
        UserTx::rollback(self).await
    }
}

#[async_trait]
impl TxStore for Arc<dyn UserDb> {
    type Tx = Box<dyn UserTx>;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        UserDb::begin(self.as_ref()).await
    }
}
