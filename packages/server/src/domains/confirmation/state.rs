use std::fmt;

use super::errors::FlowError;

/// Position of an entity within Start → Verify → Finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlowState {
    Pending,
    Verified,
    Finished,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Pending => "pending",
            FlowState::Verified => "verified",
            FlowState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Which ephemeral keys exist for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyPresence {
    pub code: bool,
    pub token: bool,
}

impl KeyPresence {
    /// State implied by the keys alone: a live code means `Pending`, a live
    /// token means `Verified`, neither means not started or already done.
    pub fn state(self) -> Result<FlowState, FlowError> {
        match (self.code, self.token) {
            (true, false) => Ok(FlowState::Pending),
            (false, true) => Ok(FlowState::Verified),
            (false, false) => Ok(FlowState::Finished),
            (true, true) => Err(FlowError::Inconsistent(
                "both verification code and finish token are present".to_string(),
            )),
        }
    }
}
