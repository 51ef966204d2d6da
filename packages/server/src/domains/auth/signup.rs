//! Signup: Start creates the user lazily, Finish activates it and opens a session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::TokenResponse;
use crate::common::{FieldErrors, Phone};
use crate::db::{StoreError, UserDb, UserTx};
use crate::domains::confirmation::requests::{PHONE_FIELD, REFERRER_PHONE_FIELD};
use crate::domains::confirmation::{
    ConfirmationFlow, FlowConfig, FlowError, FlowHooks, FlowState, KeyPresence, KeyTemplate,
    Request, Step, TxOf,
};
use crate::domains::sessions::{Claims, SessionStorage};
use crate::domains::user::{NewUser, Password, User, UserStatus};
use crate::kernel::{NotificationAction, ServerDeps};

pub const USER_EXISTS_MESSAGE: &str = "user already exists";
pub const USER_NOT_FOUND_MESSAGE: &str = "user not found";
pub const REFERRER_NOT_FOUND_MESSAGE: &str = "referrer not found";
pub const SIGNUP_TOKEN_FIELD: &str = "signup_token";

pub type SignupFlow = ConfirmationFlow<SignupHooks>;

pub struct SignupHooks {
    users: Arc<dyn UserDb>,
    sessions: Arc<dyn SessionStorage>,
    session_ttl: Duration,
}

impl SignupHooks {
    pub fn new(
        users: Arc<dyn UserDb>,
        sessions: Arc<dyn SessionStorage>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    /// Looks up `phone` for error enrichment. Store failures are logged and
    /// treated as "unknown" so they never replace the validation errors.
    async fn lookup(&self, phone: &Phone) -> Option<Option<User>> {
        match self.users.find_by_phone(phone).await {
            Ok(found) => Some(found),
            Err(e) => {
                warn!(phone = %phone, error = %e, "lookup during validation failed");
                None
            }
        }
    }
}

pub fn signup_config(deps: &ServerDeps) -> FlowConfig {
    FlowConfig {
        name: "signup",
        code_key: KeyTemplate::new("user:{}:signup:code"),
        token_key: KeyTemplate::new("user:{}:signup:token"),
        resend_key: KeyTemplate::new("user:{}:signup:resend"),
        code_ttl: deps.auth.signup_ttl,
        token_ttl: deps.auth.signup_ttl,
        resend_delay: deps.auth.retry_delay,
        code_action: NotificationAction::RegistrationConfirmationRequested,
        completed_action: Some(NotificationAction::RegistrationCompleted),
        token_field: SIGNUP_TOKEN_FIELD,
    }
}

pub fn signup_flow(deps: &ServerDeps) -> SignupFlow {
    ConfirmationFlow::new(
        SignupHooks::new(deps.users.clone(), deps.sessions.clone(), deps.auth.token_ttl),
        deps.kv.clone(),
        deps.notifier.clone(),
        deps.generator.clone(),
        signup_config(deps),
    )
}

#[async_trait]
impl FlowHooks for SignupHooks {
    type Store = Arc<dyn UserDb>;
    type Entity = User;
    type Finished = TokenResponse;

    fn store(&self) -> &Self::Store {
        &self.users
    }

    async fn resolve_entity(
        &self,
        tx: &mut TxOf<Self>,
        step: Step<'_>,
    ) -> Result<User, FlowError> {
        if let Some(user) = tx.find_by_phone(step.phone(), true).await? {
            return Ok(user);
        }

        // Only Start may create. A concurrent creator makes the insert wait
        // for its commit and then fail with AlreadyExists.
        match step {
            Step::Start(input) => tx
                .create(NewUser {
                    phone: input.phone.clone(),
                    referrer_phone: input.referrer_phone.clone(),
                })
                .await
                .map_err(|e| match e {
                    StoreError::AlreadyExists => {
                        FlowError::field(PHONE_FIELD, USER_EXISTS_MESSAGE)
                    }
                    StoreError::ReferrerNotFound => {
                        FlowError::field(REFERRER_PHONE_FIELD, REFERRER_NOT_FOUND_MESSAGE)
                    }
                    other => other.into(),
                }),
            _ => Err(FlowError::field(PHONE_FIELD, USER_NOT_FOUND_MESSAGE)),
        }
    }

    fn derive_state(&self, user: &User, _keys: KeyPresence) -> Result<FlowState, FlowError> {
        Ok(match user.status {
            UserStatus::Created | UserStatus::Pending => FlowState::Pending,
            UserStatus::Verified => FlowState::Verified,
            UserStatus::Active => FlowState::Finished,
        })
    }

    fn ensure_can_start(&self, _user: &User, state: FlowState) -> Result<(), FlowError> {
        if state == FlowState::Finished {
            return Err(FlowError::field(PHONE_FIELD, USER_EXISTS_MESSAGE));
        }
        Ok(())
    }

    async fn apply_transition(
        &self,
        tx: &mut TxOf<Self>,
        user: &mut User,
        target: FlowState,
        step: Step<'_>,
    ) -> Result<(), FlowError> {
        match (target, step) {
            (FlowState::Pending, _) => user.set_status(UserStatus::Pending),
            (FlowState::Verified, _) => user.set_status(UserStatus::Verified),
            (FlowState::Finished, Step::Finish(input)) => {
                user.activate(Password::hash(&input.password)?)
            }
            (FlowState::Finished, other) => {
                return Err(FlowError::Inconsistent(format!(
                    "cannot finish signup from the {} step",
                    other.name()
                )))
            }
        }

        tx.update(user).await?;
        Ok(())
    }

    async fn on_validation_failure(
        &self,
        request: Request<'_>,
        mut errors: FieldErrors,
    ) -> FieldErrors {
        let phone = Phone::parse(request.raw_phone()).ok();

        if let Request::Start(start) = request {
            if let Some(phone) = phone.filter(|_| !errors.has_field(PHONE_FIELD)) {
                if let Some(Some(user)) = self.lookup(&phone).await {
                    if user.is_active() {
                        errors.add(PHONE_FIELD, USER_EXISTS_MESSAGE);
                    }
                }
            }

            let referrer = start
                .referrer_phone
                .as_deref()
                .and_then(|raw| Phone::parse(raw).ok());
            if let Some(referrer) = referrer.filter(|_| !errors.has_field(REFERRER_PHONE_FIELD)) {
                match self.lookup(&referrer).await {
                    Some(Some(user)) if user.is_active() => {}
                    Some(_) => errors.add(REFERRER_PHONE_FIELD, REFERRER_NOT_FOUND_MESSAGE),
                    None => {}
                }
            }
            return errors;
        }

        if let Some(phone) = phone.filter(|_| !errors.has_field(PHONE_FIELD)) {
            if let Some(None) = self.lookup(&phone).await {
                errors.add(PHONE_FIELD, USER_NOT_FOUND_MESSAGE);
            }
        }
        errors
    }

    async fn finish_response(
        &self,
        _tx: &mut TxOf<Self>,
        user: &User,
    ) -> Result<TokenResponse, FlowError> {
        let claims = Claims {
            user_id: user.id,
            phone: user.phone.clone(),
        };
        let token = self.sessions.create(&claims, self.session_ttl).await?;
        Ok(TokenResponse { token })
    }
}
