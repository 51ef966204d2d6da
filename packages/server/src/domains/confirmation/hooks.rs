use async_trait::async_trait;

use super::errors::FlowError;
use super::requests::{Request, Step};
use super::state::{FlowState, KeyPresence};
use crate::common::{FieldErrors, Phone};
use crate::db::TxStore;

/// The subject of a flow
pub trait FlowEntity: Send + Sync + 'static {
    /// Identity the keys are rendered for and notifications are sent to
    fn identity(&self) -> &Phone;
}

/// Transaction type used by a set of hooks
pub type TxOf<H> = <<H as FlowHooks>::Store as TxStore>::Tx;

/// What a concrete flow plugs into [`ConfirmationFlow`](super::ConfirmationFlow).
///
/// Only `apply_transition` may write entity fields.
#[async_trait]
pub trait FlowHooks: Send + Sync + 'static {
    type Store: TxStore;
    type Entity: FlowEntity;
    type Finished: Send;

    fn store(&self) -> &Self::Store;

    /// Load the entity under a row lock, creating it when the step allows
    async fn resolve_entity(
        &self,
        tx: &mut TxOf<Self>,
        step: Step<'_>,
    ) -> Result<Self::Entity, FlowError>;

    /// Current state from the entity and the ephemeral keys. Must not touch storage.
    fn derive_state(
        &self,
        entity: &Self::Entity,
        keys: KeyPresence,
    ) -> Result<FlowState, FlowError>;

    /// Refuse a Start that makes no sense from `state`
    fn ensure_can_start(&self, _entity: &Self::Entity, _state: FlowState) -> Result<(), FlowError> {
        Ok(())
    }

    /// Persist the entity side of moving to `target`
    async fn apply_transition(
        &self,
        tx: &mut TxOf<Self>,
        entity: &mut Self::Entity,
        target: FlowState,
        step: Step<'_>,
    ) -> Result<(), FlowError>;

    /// Add domain specific causes to a failed validation
    async fn on_validation_failure(&self, request: Request<'_>, errors: FieldErrors)
        -> FieldErrors;

    /// Build the result of a successful Finish
    async fn finish_response(
        &self,
        tx: &mut TxOf<Self>,
        entity: &Self::Entity,
    ) -> Result<Self::Finished, FlowError>;
}
