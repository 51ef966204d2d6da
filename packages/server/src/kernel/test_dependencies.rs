// TestDependencies - mock implementations for testing
//
// In-process stores plus recording doubles for the notifier and the code
// generator, wired into a ServerDeps.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{BaseCodeGenerator, BaseNotifier, MemoryKvStore, Notification, ServerDeps};
use crate::common::Phone;
use crate::config::AuthSettings;
use crate::db::MemoryUserDb;
use crate::domains::sessions::{MemorySessions, SessionStorage};

// =============================================================================
// Recording Notifier
// =============================================================================

/// A notification captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub phone: Phone,
    pub notification: Notification,
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before recording, to widen race windows in tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    /// Code of the latest notification sent to `phone`
    pub fn last_code(&self, phone: &Phone) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| &s.phone == phone && s.notification.code.is_some())
            .and_then(|s| s.notification.code.clone())
    }
}

#[async_trait]
impl BaseNotifier for RecordingNotifier {
    async fn notify(&self, identity: &Phone, notification: &Notification) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(SentNotification {
            phone: identity.clone(),
            notification: notification.clone(),
        });
        Ok(())
    }
}

// =============================================================================
// Failing Notifier
// =============================================================================

/// Always fails, counting attempts
#[derive(Clone, Default)]
pub struct FailingNotifier {
    attempts: Arc<Mutex<usize>>,
}

impl FailingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl BaseNotifier for FailingNotifier {
    async fn notify(&self, _identity: &Phone, _notification: &Notification) -> Result<()> {
        *self.attempts.lock().unwrap() += 1;
        Err(anyhow!("sms gateway unavailable"))
    }
}

// =============================================================================
// Fixed Generator
// =============================================================================

/// Hands out queued codes and tokens, then falls back to fixed defaults
#[derive(Clone)]
pub struct FixedGenerator {
    codes: Arc<Mutex<VecDeque<String>>>,
    tokens: Arc<Mutex<VecDeque<String>>>,
    default_code: String,
    default_token: String,
}

impl FixedGenerator {
    pub fn new(code: &str, token: &str) -> Self {
        Self {
            codes: Arc::new(Mutex::new(VecDeque::new())),
            tokens: Arc::new(Mutex::new(VecDeque::new())),
            default_code: code.to_string(),
            default_token: token.to_string(),
        }
    }

    pub fn push_code(&self, code: &str) {
        self.codes.lock().unwrap().push_back(code.to_string());
    }

    pub fn push_token(&self, token: &str) {
        self.tokens.lock().unwrap().push_back(token.to_string());
    }
}

impl BaseCodeGenerator for FixedGenerator {
    fn random_code(&self) -> String {
        self.codes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_code.clone())
    }

    fn random_token(&self) -> String {
        self.tokens
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_token.clone())
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// All-in-memory dependencies with handles on the doubles
#[derive(Clone)]
pub struct TestDependencies {
    pub users: MemoryUserDb,
    pub kv: MemoryKvStore,
    pub notifier: RecordingNotifier,
    pub generator: FixedGenerator,
    pub sessions: Arc<dyn SessionStorage>,
    pub auth: AuthSettings,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            users: MemoryUserDb::new(),
            kv: MemoryKvStore::new(),
            notifier: RecordingNotifier::new(),
            generator: FixedGenerator::new("556611", "T"),
            sessions: Arc::new(MemorySessions::new()),
            auth: AuthSettings {
                retry_delay: None,
                ..AuthSettings::default()
            },
        }
    }

    pub fn with_notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_auth(mut self, auth: AuthSettings) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStorage>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn server_deps(&self) -> ServerDeps {
        self.server_deps_with_notifier(Arc::new(self.notifier.clone()))
    }

    /// Same dependencies with a different notifier
    pub fn server_deps_with_notifier(&self, notifier: Arc<dyn BaseNotifier>) -> ServerDeps {
        ServerDeps::new(
            Arc::new(self.users.clone()),
            Arc::new(self.kv.clone()),
            notifier,
            Arc::new(self.generator.clone()),
            self.sessions.clone(),
            self.auth.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
