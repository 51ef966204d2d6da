//! Auth domain - phone based identity
//!
//! Responsibilities:
//! - Signup and password recovery, both driven by the confirmation engine
//! - Sign-in with phone and password
//! - Session sign-out, refresh and check

pub mod actions;
pub mod recovery;
pub mod signup;

use serde::Serialize;

use crate::common::Phone;
use crate::domains::confirmation::FlowEntity;
use crate::domains::user::User;
use crate::kernel::ServerDeps;

pub use recovery::{recovery_flow, RecoveryFlow, RecoveryHooks};
pub use signup::{signup_flow, SignupFlow, SignupHooks};

/// A freshly issued session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

impl FlowEntity for User {
    fn identity(&self) -> &Phone {
        &self.phone
    }
}

/// Both confirmation flows, built once per process
pub struct AuthFlows {
    pub signup: SignupFlow,
    pub recovery: RecoveryFlow,
}

impl AuthFlows {
    pub fn new(deps: &ServerDeps) -> Self {
        Self {
            signup: signup_flow(deps),
            recovery: recovery_flow(deps),
        }
    }
}
