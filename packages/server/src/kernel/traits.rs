// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Flow rules live in domains/ and reach infrastructure through these traits.
//
// Naming convention: Base* for trait names (e.g., BaseKvStore, BaseNotifier)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::common::Phone;
use crate::kernel::kv_store::KvError;
use crate::kernel::notifier::Notification;

// =============================================================================
// Key-Value Store Trait (Infrastructure - ephemeral codes and tokens)
// =============================================================================

#[async_trait]
pub trait BaseKvStore: Send + Sync {
    /// Fetch a value, `KvError::NotFound` when the key is absent or expired
    async fn get(&self, key: &str) -> Result<String, KvError>;

    /// Store a value without expiry
    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Store a value that disappears after `ttl`
    async fn set_with_expire(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), KvError>;

    /// Remove a key, `KvError::NotFound` when it was not there
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Like `get` but maps a missing key to `None`
    async fn get_optional(&self, key: &str) -> Result<Option<String>, KvError> {
        match self.get(key).await {
            Ok(value) => Ok(Some(value)),
            Err(KvError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Like `delete` but a missing key is not an error. Returns whether a key was removed.
    async fn delete_if_exists(&self, key: &str) -> Result<bool, KvError> {
        match self.delete(key).await {
            Ok(()) => Ok(true),
            Err(KvError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// Notifier Trait (Infrastructure - SMS, logs)
// =============================================================================

#[async_trait]
pub trait BaseNotifier: Send + Sync {
    /// Deliver `notification` to the owner of `identity`
    async fn notify(&self, identity: &Phone, notification: &Notification) -> Result<()>;
}

// =============================================================================
// Code Generator Trait (Infrastructure - randomness)
// =============================================================================

pub trait BaseCodeGenerator: Send + Sync {
    /// Short verification code sent to the user
    fn random_code(&self) -> String;

    /// Opaque finish token handed back after verification
    fn random_token(&self) -> String;
}
