use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, info, warn};

use super::errors::FlowError;
use super::hooks::{FlowEntity, FlowHooks, TxOf};
use super::keys::{FlowKeys, KeyTemplate};
use super::requests::{
    FinishInput, FinishRequest, Request, StartInput, StartRequest, Step, VerifyInput,
    VerifyRequest, CODE_FIELD, PHONE_FIELD,
};
use super::state::{FlowState, KeyPresence};
use crate::common::{FieldErrors, Phone};
use crate::db::{self, TxStore};
use crate::kernel::{
    BaseCodeGenerator, BaseKvStore, BaseNotifier, Notification, NotificationAction,
};

pub const CODE_WRONG_MESSAGE: &str = "code is wrong";
pub const RESEND_MESSAGE: &str = "verification code already sent, retry later";

/// Per-flow parameters of the engine
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Flow name used in logs
    pub name: &'static str,
    pub code_key: KeyTemplate,
    pub token_key: KeyTemplate,
    pub resend_key: KeyTemplate,
    pub code_ttl: Duration,
    pub token_ttl: Duration,
    /// Minimum delay between two Starts, `None` disables the throttle
    pub resend_delay: Option<Duration>,
    pub code_action: NotificationAction,
    pub completed_action: Option<NotificationAction>,
    /// Name the finish token travels under
    pub token_field: &'static str,
}

/// Result of Verify: the finish token under the flow's token field name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishToken {
    pub field: &'static str,
    pub token: String,
}

impl Serialize for FinishToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.field, &self.token)?;
        map.end()
    }
}

/// Generic Start/Verify/Finish state machine
pub struct ConfirmationFlow<H: FlowHooks> {
    hooks: H,
    kv: Arc<dyn BaseKvStore>,
    notifier: Arc<dyn BaseNotifier>,
    generator: Arc<dyn BaseCodeGenerator>,
    config: FlowConfig,
}

impl<H: FlowHooks> ConfirmationFlow<H> {
    pub fn new(
        hooks: H,
        kv: Arc<dyn BaseKvStore>,
        notifier: Arc<dyn BaseNotifier>,
        generator: Arc<dyn BaseCodeGenerator>,
        config: FlowConfig,
    ) -> Self {
        Self {
            hooks,
            kv,
            notifier,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn keys(&self, identity: &Phone) -> FlowKeys {
        FlowKeys {
            code: self.config.code_key.render(identity),
            token: self.config.token_key.render(identity),
            resend: self.config.resend_key.render(identity),
        }
    }

    // =========================================================================
    // Steps
    // =========================================================================

    /// Issue a verification code and move the entity to `Pending`
    pub async fn start(&self, request: &StartRequest) -> Result<(), FlowError> {
        let input = match request.validate() {
            Ok(input) => input,
            Err(errors) => return Err(self.rejected(Request::Start(request), errors).await),
        };

        let mut tx = self.hooks.store().begin().await?;
        let outcome = AssertUnwindSafe(self.start_in_tx(&mut tx, &input))
            .catch_unwind()
            .await;
        db::settle(tx, outcome).await?;

        info!(flow = self.config.name, phone = %input.phone, "verification code issued");
        Ok(())
    }

    /// Trade the verification code for a finish token
    pub async fn verify(&self, request: &VerifyRequest) -> Result<FinishToken, FlowError> {
        let input = match request.validate() {
            Ok(input) => input,
            Err(errors) => return Err(self.rejected(Request::Verify(request), errors).await),
        };

        let mut tx = self.hooks.store().begin().await?;
        let outcome = AssertUnwindSafe(self.verify_in_tx(&mut tx, &input))
            .catch_unwind()
            .await;
        let token = db::settle(tx, outcome).await?;

        info!(flow = self.config.name, phone = %input.phone, "verification code accepted");
        Ok(token)
    }

    /// Trade the finish token for the flow's result
    pub async fn finish(&self, request: &FinishRequest) -> Result<H::Finished, FlowError> {
        let input = match request.validate(self.config.token_field) {
            Ok(input) => input,
            Err(errors) => return Err(self.rejected(Request::Finish(request), errors).await),
        };

        let mut tx = self.hooks.store().begin().await?;
        let outcome = AssertUnwindSafe(self.finish_in_tx(&mut tx, &input))
            .catch_unwind()
            .await;
        let finished = db::settle(tx, outcome).await?;

        info!(flow = self.config.name, phone = %input.phone, "flow finished");
        Ok(finished)
    }

    // =========================================================================
    // Transactional bodies
    // =========================================================================

    async fn start_in_tx(
        &self,
        tx: &mut TxOf<H>,
        input: &StartInput,
    ) -> Result<(), FlowError> {
        let step = Step::Start(input);
        let mut entity = self.hooks.resolve_entity(tx, step).await?;
        let identity = entity.identity().clone();
        let keys = self.keys(&identity);

        let (code, token) = self.load_keys(&keys).await?;
        let state = self.state_of(&entity, &code, &token)?;
        self.hooks.ensure_can_start(&entity, state)?;

        if self.config.resend_delay.is_some() && self.kv.get_optional(&keys.resend).await?.is_some()
        {
            debug!(flow = self.config.name, phone = %identity, "start throttled");
            return Err(FlowError::field(PHONE_FIELD, RESEND_MESSAGE));
        }

        let code = self.generator.random_code();
        self.kv
            .set_with_expire(&keys.code, &code, self.config.code_ttl)
            .await?;
        self.kv.delete_if_exists(&keys.token).await?;

        let notification = Notification::with_code(self.config.code_action, code);
        if let Err(e) = self.notifier.notify(&identity, &notification).await {
            warn!(flow = self.config.name, phone = %identity, error = %e, "code notification failed");
            if let Err(cleanup) = self.kv.delete_if_exists(&keys.code).await {
                warn!(phone = %identity, error = %cleanup, "failed to drop undelivered code");
            }
            return Err(FlowError::Notify(e));
        }

        self.hooks
            .apply_transition(tx, &mut entity, FlowState::Pending, step)
            .await?;

        if let Some(delay) = self.config.resend_delay {
            self.kv.set_with_expire(&keys.resend, "1", delay).await?;
        }
        Ok(())
    }

    async fn verify_in_tx(
        &self,
        tx: &mut TxOf<H>,
        input: &VerifyInput,
    ) -> Result<FinishToken, FlowError> {
        let step = Step::Verify(input);
        let mut entity = self.hooks.resolve_entity(tx, step).await?;
        let keys = self.keys(entity.identity());

        let (code, token) = self.load_keys(&keys).await?;
        let state = self.state_of(&entity, &code, &token)?;

        // Missing and wrong codes look the same to the caller.
        // A wrong code is kept so the user can retry.
        if code.as_deref() != Some(input.code.as_str()) {
            debug!(flow = self.config.name, phone = %input.phone, "verification code mismatch");
            return Err(FlowError::field(CODE_FIELD, CODE_WRONG_MESSAGE));
        }
        self.kv.delete_if_exists(&keys.code).await?;

        if state != FlowState::Pending {
            warn!(flow = self.config.name, phone = %input.phone, %state, "verify not allowed");
            return Err(FlowError::NotAllowed);
        }

        let token = self.generator.random_token();
        self.kv
            .set_with_expire(&keys.token, &token, self.config.token_ttl)
            .await?;

        self.hooks
            .apply_transition(tx, &mut entity, FlowState::Verified, step)
            .await?;

        Ok(FinishToken {
            field: self.config.token_field,
            token,
        })
    }

    async fn finish_in_tx(
        &self,
        tx: &mut TxOf<H>,
        input: &FinishInput,
    ) -> Result<H::Finished, FlowError> {
        let step = Step::Finish(input);
        let mut entity = self.hooks.resolve_entity(tx, step).await?;
        let identity = entity.identity().clone();
        let keys = self.keys(&identity);

        let (code, token) = self.load_keys(&keys).await?;
        let state = self.state_of(&entity, &code, &token)?;

        if token.as_deref() != Some(input.token.as_str()) {
            debug!(flow = self.config.name, phone = %identity, "finish token mismatch");
            let field = self.config.token_field;
            return Err(FlowError::field(field, format!("{} is wrong", field)));
        }
        self.kv.delete_if_exists(&keys.token).await?;

        if state != FlowState::Verified {
            warn!(flow = self.config.name, phone = %identity, %state, "finish not allowed");
            return Err(FlowError::NotAllowed);
        }

        self.hooks
            .apply_transition(tx, &mut entity, FlowState::Finished, step)
            .await?;

        if let Some(action) = self.config.completed_action {
            self.notifier
                .notify(&identity, &Notification::new(action))
                .await
                .map_err(FlowError::Notify)?;
        }

        self.hooks.finish_response(tx, &entity).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load_keys(
        &self,
        keys: &FlowKeys,
    ) -> Result<(Option<String>, Option<String>), FlowError> {
        let code = self.kv.get_optional(&keys.code).await?;
        let token = self.kv.get_optional(&keys.token).await?;
        Ok((code, token))
    }

    fn state_of(
        &self,
        entity: &H::Entity,
        code: &Option<String>,
        token: &Option<String>,
    ) -> Result<FlowState, FlowError> {
        self.hooks.derive_state(
            entity,
            KeyPresence {
                code: code.is_some(),
                token: token.is_some(),
            },
        )
    }

    async fn rejected(&self, request: Request<'_>, errors: FieldErrors) -> FlowError {
        let errors = self.hooks.on_validation_failure(request, errors).await;
        debug!(flow = self.config.name, errors = %errors, "request rejected");
        FlowError::Fields(errors)
    }
}
