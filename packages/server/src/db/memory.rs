//! In-process user store.
//!
//! Emulates the parts of Postgres the flows rely on: per-row locks held until
//! the transaction ends, and a unique phone constraint where a second
//! inserter waits for the first transaction and then fails with
//! `AlreadyExists`. Writes are staged and become visible on commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::debug;

use super::{StoreError, UserDb, UserTx};
use crate::common::Phone;
use crate::domains::user::{NewUser, User};

#[derive(Default)]
struct Tables {
    users: Mutex<HashMap<Phone, User>>,
    locks: Mutex<HashMap<Phone, Arc<RowLock<()>>>>,
}

impl Tables {
    fn users(&self) -> MutexGuard<'_, HashMap<Phone, User>> {
        // A poisoned map still holds consistent rows: writes are single inserts
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn committed(&self, phone: &Phone) -> Option<User> {
        self.users().get(phone).cloned()
    }

    fn row_lock(&self, phone: &Phone) -> Arc<RowLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(phone.clone()).or_default().clone()
    }
}

#[derive(Clone, Default)]
pub struct MemoryUserDb {
    tables: Arc<Tables>,
}

impl MemoryUserDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a committed row directly
    pub fn seed(&self, user: User) {
        self.tables.users().insert(user.phone.clone(), user);
    }

    /// Committed row for `phone`
    pub fn get(&self, phone: &Phone) -> Option<User> {
        self.tables.committed(phone)
    }

    /// Number of committed rows
    pub fn count(&self) -> usize {
        self.tables.users().len()
    }
}

#[async_trait]
impl UserDb for MemoryUserDb {
    async fn begin(&self) -> Result<Box<dyn UserTx>, StoreError> {
        Ok(Box::new(MemoryUserTx {
            tables: self.tables.clone(),
            held: HashMap::new(),
            staged: HashMap::new(),
        }))
    }

    async fn find_by_phone(&self, phone: &Phone) -> Result<Option<User>, StoreError> {
        Ok(self.tables.committed(phone))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct MemoryUserTx {
    tables: Arc<Tables>,
    held: HashMap<Phone, OwnedMutexGuard<()>>,
    staged: HashMap<Phone, User>,
}

impl MemoryUserTx {
    async fn lock_row(&mut self, phone: &Phone) {
        if self.held.contains_key(phone) {
            return;
        }
        let guard = self.tables.row_lock(phone).lock_owned().await;
        self.held.insert(phone.clone(), guard);
    }

    fn release(&mut self) {
        self.held.clear();
        self.staged.clear();
    }
}

#[async_trait]
impl UserTx for MemoryUserTx {
    async fn find_by_phone(
        &mut self,
        phone: &Phone,
        lock: bool,
    ) -> Result<Option<User>, StoreError> {
        if let Some(user) = self.staged.get(phone) {
            return Ok(Some(user.clone()));
        }

        // FOR UPDATE locks nothing when no row matches
        if lock && self.tables.committed(phone).is_some() {
            self.lock_row(phone).await;
        }

        Ok(self.tables.committed(phone))
    }

    async fn create(&mut self, new_user: NewUser) -> Result<User, StoreError> {
        self.lock_row(&new_user.phone).await;

        if self.staged.contains_key(&new_user.phone)
            || self.tables.committed(&new_user.phone).is_some()
        {
            return Err(StoreError::AlreadyExists);
        }

        let referrer = match &new_user.referrer_phone {
            Some(referrer_phone) => match self.tables.committed(referrer_phone) {
                Some(referrer) if referrer.is_active() => Some(referrer),
                _ => return Err(StoreError::ReferrerNotFound),
            },
            None => None,
        };

        let user = User::new(new_user.phone, referrer.as_ref());
        debug!(phone = %user.phone, user_id = %user.id, "user row staged");
        self.staged.insert(user.phone.clone(), user.clone());
        Ok(user)
    }

    async fn update(&mut self, user: &User) -> Result<(), StoreError> {
        if !self.held.contains_key(&user.phone) {
            return Err(StoreError::NotLocked(user.phone.to_string()));
        }
        self.staged.insert(user.phone.clone(), user.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        {
            let mut users = self.tables.users();
            for (phone, user) in self.staged.drain() {
                users.insert(phone, user);
            }
        }
        self.release();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::user::{Password, UserStatus};
    use std::time::Duration;

    fn phone(raw: &str) -> Phone {
        Phone::parse(raw).unwrap()
    }

    fn new_user(raw: &str) -> NewUser {
        NewUser {
            phone: phone(raw),
            referrer_phone: None,
        }
    }

    #[tokio::test]
    async fn test_create_visible_after_commit() {
        let db = MemoryUserDb::new();
        let mut tx = UserDb::begin(&db).await.unwrap();

        let created = tx.create(new_user("+79871111111")).await.unwrap();
        assert_eq!(created.status, UserStatus::Created);
        assert!(db.get(&created.phone).is_none());

        tx.commit().await.unwrap();
        assert_eq!(db.get(&created.phone).unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let db = MemoryUserDb::new();
        let mut tx = UserDb::begin(&db).await.unwrap();
        tx.create(new_user("+79871111111")).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(db.count(), 0);
    }

    #[tokio::test]
    async fn test_second_inserter_waits_then_conflicts() {
        let db = MemoryUserDb::new();

        let mut first = UserDb::begin(&db).await.unwrap();
        first.create(new_user("+79871111111")).await.unwrap();

        let db2 = db.clone();
        let second = tokio::spawn(async move {
            let mut tx = UserDb::begin(&db2).await.unwrap();
            let result = tx.create(new_user("+79871111111")).await;
            tx.rollback().await.unwrap();
            result
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!second.is_finished());

        first.commit().await.unwrap();
        let result = second.await.unwrap();
        assert!(matches!(result, Err(StoreError::AlreadyExists)));
        assert_eq!(db.count(), 1);
    }

    #[tokio::test]
    async fn test_referrer_must_be_active() {
        let db = MemoryUserDb::new();
        db.seed(User::new(phone("+79870000000"), None));

        let mut tx = UserDb::begin(&db).await.unwrap();
        let result = tx
            .create(NewUser {
                phone: phone("+79871111111"),
                referrer_phone: Some(phone("+79870000000")),
            })
            .await;
        assert!(matches!(result, Err(StoreError::ReferrerNotFound)));

        let mut referrer = User::new(phone("+79872222222"), None);
        referrer.activate(Password::hash("x").unwrap());
        db.seed(referrer.clone());

        let created = tx
            .create(NewUser {
                phone: phone("+79871111111"),
                referrer_phone: Some(referrer.phone.clone()),
            })
            .await
            .unwrap();
        assert_eq!(created.referrer_id, Some(referrer.id));
    }

    #[tokio::test]
    async fn test_update_requires_lock() {
        let db = MemoryUserDb::new();
        let user = User::new(phone("+79871111111"), None);
        db.seed(user.clone());

        let mut tx = UserDb::begin(&db).await.unwrap();
        assert!(matches!(
            tx.update(&user).await,
            Err(StoreError::NotLocked(_))
        ));

        let mut locked = tx.find_by_phone(&user.phone, true).await.unwrap().unwrap();
        locked.set_status(UserStatus::Pending);
        tx.update(&locked).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.get(&user.phone).unwrap().status, UserStatus::Pending);
    }

    #[tokio::test]
    async fn test_locked_row_blocks_other_transaction() {
        let db = MemoryUserDb::new();
        let user = User::new(phone("+79871111111"), None);
        db.seed(user.clone());

        let mut first = UserDb::begin(&db).await.unwrap();
        first.find_by_phone(&user.phone, true).await.unwrap();

        let db2 = db.clone();
        let phone2 = user.phone.clone();
        let second = tokio::spawn(async move {
            let mut tx = UserDb::begin(&db2).await.unwrap();
            let found = tx.find_by_phone(&phone2, true).await.unwrap();
            tx.rollback().await.unwrap();
            found.map(|u| u.status)
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!second.is_finished());

        let mut locked = first.find_by_phone(&user.phone, true).await.unwrap().unwrap();
        locked.set_status(UserStatus::Pending);
        first.update(&locked).await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(second.await.unwrap(), Some(UserStatus::Pending));
    }
}
