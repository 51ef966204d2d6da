use axum::http::StatusCode;
use thiserror::Error;

use crate::common::{ErrorView, FieldError, FieldErrors};
use crate::db::{StoreError, TxError};
use crate::domains::sessions::SessionError;
use crate::kernel::KvError;

pub const NOT_ALLOWED_MESSAGE: &str = "such action not allowed";
const INTERNAL_MESSAGE: &str = "internal error";
const UNAUTHORIZED_MESSAGE: &str = "unauthorized";

#[derive(Error, Debug)]
pub enum FlowError {
    /// Field scoped validation or domain conflict, shown verbatim
    #[error("{0}")]
    Fields(FieldErrors),

    /// The step is not legal from the current flow state
    #[error("such action not allowed")]
    NotAllowed,

    #[error("inconsistent flow state: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("notification failed: {0}")]
    Notify(anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),

    #[error("{cause} (rollback failed: {rollback})")]
    Rollback {
        cause: Box<FlowError>,
        rollback: StoreError,
    },
}

impl FlowError {
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        FlowError::Fields(FieldErrors::single(FieldError::new(name, message)))
    }

    /// Field errors carried by this error, looking through rollback failures
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            FlowError::Fields(fields) => Some(fields),
            FlowError::Rollback { cause, .. } => cause.field_errors(),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            FlowError::Fields(_) | FlowError::NotAllowed => StatusCode::BAD_REQUEST,
            FlowError::Session(e) if e.is_unauthorized() => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the caller may see. Infrastructure details stay in the logs.
    pub fn public_view(&self) -> ErrorView {
        match self {
            FlowError::Fields(fields) => ErrorView::fields(fields.clone()),
            FlowError::NotAllowed => ErrorView::message(NOT_ALLOWED_MESSAGE),
            FlowError::Session(e) if e.is_unauthorized() => {
                ErrorView::message(UNAUTHORIZED_MESSAGE)
            }
            _ => ErrorView::message(INTERNAL_MESSAGE),
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<FieldErrors> for FlowError {
    fn from(fields: FieldErrors) -> Self {
        FlowError::Fields(fields)
    }
}

impl From<TxError<FlowError>> for FlowError {
    fn from(err: TxError<FlowError>) -> Self {
        match err {
            TxError::Aborted(e) => e,
            TxError::Commit(e) => FlowError::Store(e),
            TxError::Rollback { closure, rollback } => FlowError::Rollback {
                cause: Box::new(closure),
                rollback,
            },
        }
    }
}
