//! Notifications emitted by the flows and the notifier implementations.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use twilio::TwilioService;

use super::traits::BaseNotifier;
use crate::common::Phone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    RegistrationConfirmationRequested,
    RegistrationCompleted,
    RecoveryConfirmationRequested,
    RecoveryCompleted,
}

impl NotificationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationAction::RegistrationConfirmationRequested => {
                "registration_confirmation_requested"
            }
            NotificationAction::RegistrationCompleted => "registration_completed",
            NotificationAction::RecoveryConfirmationRequested => "recovery_confirmation_requested",
            NotificationAction::RecoveryCompleted => "recovery_completed",
        }
    }
}

impl fmt::Display for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message for one identity: what happened plus the code, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub action: NotificationAction,
    pub code: Option<String>,
}

impl Notification {
    pub fn new(action: NotificationAction) -> Self {
        Self { action, code: None }
    }

    pub fn with_code(action: NotificationAction, code: impl Into<String>) -> Self {
        Self {
            action,
            code: Some(code.into()),
        }
    }

    /// Human readable SMS text
    pub fn render_text(&self) -> String {
        let code = self.code.as_deref().unwrap_or_default();
        match self.action {
            NotificationAction::RegistrationConfirmationRequested => {
                format!("Your registration code: {}", code)
            }
            NotificationAction::RegistrationCompleted => {
                "Your wallet account is ready.".to_string()
            }
            NotificationAction::RecoveryConfirmationRequested => {
                format!("Your password recovery code: {}", code)
            }
            NotificationAction::RecoveryCompleted => "Your password has been changed.".to_string(),
        }
    }
}

// =============================================================================
// LogNotifier
// =============================================================================

/// Writes notifications to the log instead of delivering them.
/// Codes are not logged.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl BaseNotifier for LogNotifier {
    async fn notify(&self, identity: &Phone, notification: &Notification) -> Result<()> {
        info!(
            phone = %identity,
            action = %notification.action,
            has_code = notification.code.is_some(),
            "notification"
        );
        Ok(())
    }
}

// =============================================================================
// TwilioNotifier (adapts TwilioService to BaseNotifier)
// =============================================================================

pub struct TwilioNotifier(pub Arc<TwilioService>);

impl TwilioNotifier {
    pub fn new(service: Arc<TwilioService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseNotifier for TwilioNotifier {
    async fn notify(&self, identity: &Phone, notification: &Notification) -> Result<()> {
        let message = self
            .0
            .send_sms(identity.as_str(), &notification.render_text())
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        info!(
            phone = %identity,
            action = %notification.action,
            sid = %message.sid,
            status = %message.status,
            "sms sent"
        );
        Ok(())
    }
}
