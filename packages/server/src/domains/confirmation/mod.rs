//! Confirmation flow engine
//!
//! A three step challenge/response protocol shared by signup and password
//! recovery:
//!
//! - **Start** issues a verification code to the entity's phone
//! - **Verify** trades the code for a single use finish token
//! - **Finish** trades the token for the flow specific result
//!
//! Each step runs in one relational transaction with the entity row locked.
//! The flow state is never stored; it is derived on every request from the
//! entity and the presence of the ephemeral keys (see [`FlowHooks::derive_state`]).

pub mod engine;
pub mod errors;
pub mod hooks;
pub mod keys;
pub mod requests;
pub mod state;

pub use engine::{ConfirmationFlow, FinishToken, FlowConfig};
pub use errors::FlowError;
pub use hooks::{FlowEntity, FlowHooks, TxOf};
pub use keys::{FlowKeys, KeyTemplate};
pub use requests::{
    FinishInput, FinishRequest, Request, StartInput, StartRequest, Step, VerifyInput,
    VerifyRequest,
};
pub use state::{FlowState, KeyPresence};
