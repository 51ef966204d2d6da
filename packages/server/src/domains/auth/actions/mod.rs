//! Auth domain actions - business logic functions
//!
//! Actions are async functions called directly from the HTTP handlers.

mod session;
mod signin;

pub use session::{check, refresh, signout, CheckResponse};
pub use signin::{signin, SigninRequest, INVALID_CREDENTIALS_MESSAGE};
