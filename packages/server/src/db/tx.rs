//! Finishing a transaction according to the outcome of the work done in it.

use std::any::Any;
use std::fmt;
use std::panic;

use thiserror::Error;
use tracing::{debug, error};

use super::{StoreError, Transaction};

#[derive(Error, Debug)]
pub enum TxError<E> {
    /// The work failed and the transaction was rolled back
    #[error("{0}")]
    Aborted(E),

    #[error("commit failed: {0}")]
    Commit(StoreError),

    /// The work failed and so did the rollback
    #[error("{closure} (rollback failed: {rollback})")]
    Rollback { closure: E, rollback: StoreError },
}

impl<E> TxError<E> {
    /// The error returned by the work itself, if any
    pub fn closure_error(&self) -> Option<&E> {
        match self {
            TxError::Aborted(e) | TxError::Rollback { closure: e, .. } => Some(e),
            TxError::Commit(_) => None,
        }
    }
}

/// Panic payload used when rolling back after a panic failed as well
#[derive(Error, Debug)]
#[error("rollback failed after panic '{panic}': {rollback}")]
pub struct PanicRollbackError {
    pub panic: String,
    pub rollback: StoreError,
}

/// Commit on success, roll back on error or panic.
///
/// `outcome` is the result of `catch_unwind` around the work. A caught panic
/// is re-raised once the rollback finished; if the rollback fails the panic
/// is re-raised with a `PanicRollbackError` payload carrying both.
pub async fn settle<T, R, E>(
    tx: T,
    outcome: std::thread::Result<Result<R, E>>,
) -> Result<R, TxError<E>>
where
    T: Transaction,
    E: fmt::Display,
{
    match outcome {
        Ok(Ok(value)) => {
            tx.commit().await.map_err(|e| {
                error!(error = %e, "commit failed");
                TxError::Commit(e)
            })?;
            Ok(value)
        }
        Ok(Err(closure)) => match tx.rollback().await {
            Ok(()) => {
                debug!(error = %closure, "transaction rolled back");
                Err(TxError::Aborted(closure))
            }
            Err(rollback) => {
                error!(error = %closure, rollback_error = %rollback, "rollback failed");
                Err(TxError::Rollback { closure, rollback })
            }
        },
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            match tx.rollback().await {
                Ok(()) => {
                    error!(panic = %message, "transaction rolled back after panic");
                    panic::resume_unwind(payload)
                }
                Err(rollback) => {
                    error!(panic = %message, rollback_error = %rollback, "rollback failed after panic");
                    panic::resume_unwind(Box::new(PanicRollbackError {
                        panic: message,
                        rollback,
                    }))
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
