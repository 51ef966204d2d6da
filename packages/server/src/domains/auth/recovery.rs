//! Password recovery for active users. State comes from the ephemeral keys only.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::signup::USER_NOT_FOUND_MESSAGE;
use crate::common::{FieldErrors, Phone};
use crate::db::{UserDb, UserTx};
use crate::domains::confirmation::requests::PHONE_FIELD;
use crate::domains::confirmation::{
    ConfirmationFlow, FlowConfig, FlowError, FlowHooks, FlowState, KeyPresence, KeyTemplate,
    Request, Step, TxOf,
};
use crate::domains::user::{Password, User};
use crate::kernel::{NotificationAction, ServerDeps};

pub const RECOVERY_TOKEN_FIELD: &str = "recovery_token";

pub type RecoveryFlow = ConfirmationFlow<RecoveryHooks>;

pub struct RecoveryHooks {
    users: Arc<dyn UserDb>,
}

impl RecoveryHooks {
    pub fn new(users: Arc<dyn UserDb>) -> Self {
        Self { users }
    }
}

pub fn recovery_config(deps: &ServerDeps) -> FlowConfig {
    FlowConfig {
        name: "recovery",
        code_key: KeyTemplate::new("user:{}:recovery:code"),
        token_key: KeyTemplate::new("user:{}:recovery:token"),
        resend_key: KeyTemplate::new("user:{}:recovery:resend"),
        code_ttl: deps.auth.signup_ttl,
        token_ttl: deps.auth.signup_ttl,
        resend_delay: deps.auth.retry_delay,
        code_action: NotificationAction::RecoveryConfirmationRequested,
        completed_action: Some(NotificationAction::RecoveryCompleted),
        token_field: RECOVERY_TOKEN_FIELD,
    }
}

pub fn recovery_flow(deps: &ServerDeps) -> RecoveryFlow {
    ConfirmationFlow::new(
        RecoveryHooks::new(deps.users.clone()),
        deps.kv.clone(),
        deps.notifier.clone(),
        deps.generator.clone(),
        recovery_config(deps),
    )
}

#[async_trait]
impl FlowHooks for RecoveryHooks {
    type Store = Arc<dyn UserDb>;
    type Entity = User;
    type Finished = ();

    fn store(&self) -> &Self::Store {
        &self.users
    }

    async fn resolve_entity(
        &self,
        tx: &mut TxOf<Self>,
        step: Step<'_>,
    ) -> Result<User, FlowError> {
        match tx.find_by_phone(step.phone(), true).await? {
            Some(user) if user.is_active() => Ok(user),
            _ => Err(FlowError::field(PHONE_FIELD, USER_NOT_FOUND_MESSAGE)),
        }
    }

    fn derive_state(&self, _user: &User, keys: KeyPresence) -> Result<FlowState, FlowError> {
        keys.state()
    }

    async fn apply_transition(
        &self,
        tx: &mut TxOf<Self>,
        user: &mut User,
        target: FlowState,
        step: Step<'_>,
    ) -> Result<(), FlowError> {
        // Pending and Verified live in the key-value store only
        if target != FlowState::Finished {
            return Ok(());
        }

        let Step::Finish(input) = step else {
            return Err(FlowError::Inconsistent(format!(
                "cannot finish recovery from the {} step",
                step.name()
            )));
        };
        user.change_password(Password::hash(&input.password)?);
        tx.update(user).await?;
        Ok(())
    }

    async fn on_validation_failure(
        &self,
        request: Request<'_>,
        mut errors: FieldErrors,
    ) -> FieldErrors {
        if errors.has_field(PHONE_FIELD) {
            return errors;
        }
        let Ok(phone) = Phone::parse(request.raw_phone()) else {
            return errors;
        };

        match self.users.find_by_phone(&phone).await {
            Ok(Some(user)) if user.is_active() => {}
            Ok(_) => errors.add(PHONE_FIELD, USER_NOT_FOUND_MESSAGE),
            Err(e) => warn!(phone = %phone, error = %e, "lookup during validation failed"),
        }
        errors
    }

    async fn finish_response(
        &self,
        _tx: &mut TxOf<Self>,
        _user: &User,
    ) -> Result<(), FlowError> {
        Ok(())
    }
}
