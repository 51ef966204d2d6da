use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use super::password::Password;
use crate::common::Phone;

/// Registration progress of a user. Ordered: a flow only moves forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Created,
    Pending,
    Verified,
    Active,
}

/// User model - SQL persistence layer
#[derive(sqlx::FromRow, Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub phone: Phone,
    pub password: Option<Password>,
    pub status: UserStatus,
    pub referrer_id: Option<Uuid>,
    /// Joined from the referrer row, not a column of `users`
    pub referrer_phone: Option<Phone>,
    pub created_at: DateTime<Utc>,
    pub registered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a user at the start of signup
#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone: Phone,
    pub referrer_phone: Option<Phone>,
}

impl User {
    /// A fresh `created` user, not yet persisted
    pub fn new(phone: Phone, referrer: Option<&User>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            phone,
            password: None,
            status: UserStatus::Created,
            referrer_id: referrer.map(|r| r.id),
            referrer_phone: referrer.map(|r| r.phone.clone()),
            created_at: now,
            registered_at: None,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn set_status(&mut self, status: UserStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Finish registration: set the password and stamp `registered_at`
    pub fn activate(&mut self, password: Password) {
        self.password = Some(password);
        self.set_status(UserStatus::Active);
        self.registered_at = Some(self.updated_at);
    }

    pub fn change_password(&mut self, password: Password) {
        self.password = Some(password);
        self.updated_at = Utc::now();
    }

    /// Whether `raw` is this user's password. Users without one never match.
    pub fn check_password(&self, raw: &str) -> bool {
        self.password.as_ref().is_some_and(|p| p.verify(raw))
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl User {
    /// Find user by phone, optionally taking a row lock until the transaction ends
    pub async fn find_by_phone(
        phone: &Phone,
        lock: bool,
        conn: &mut PgConnection,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = if lock {
            "SELECT u.*, r.phone AS referrer_phone
             FROM users u
             LEFT JOIN users r ON r.id = u.referrer_id
             WHERE u.phone = $1
             FOR UPDATE OF u"
        } else {
            "SELECT u.*, r.phone AS referrer_phone
             FROM users u
             LEFT JOIN users r ON r.id = u.referrer_id
             WHERE u.phone = $1"
        };

        sqlx::query_as::<_, Self>(sql)
            .bind(phone)
            .fetch_optional(conn)
            .await
    }

    /// Insert a new user. A duplicate phone surfaces as a unique violation.
    pub async fn insert(&self, conn: &mut PgConnection) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "WITH inserted AS (
                INSERT INTO users (id, phone, password, status, referrer_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
             )
             SELECT i.*, r.phone AS referrer_phone
             FROM inserted i
             LEFT JOIN users r ON r.id = i.referrer_id",
        )
        .bind(self.id)
        .bind(&self.phone)
        .bind(&self.password)
        .bind(self.status)
        .bind(self.referrer_id)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(conn)
        .await
    }

    /// Persist mutable fields
    pub async fn update(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users
             SET password = $2, status = $3, registered_at = $4, updated_at = $5
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(&self.password)
        .bind(self.status)
        .bind(self.registered_at)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}
