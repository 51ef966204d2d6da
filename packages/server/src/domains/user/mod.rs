//! User domain - the entity driven by the signup and recovery flows

pub mod models;

pub use models::{NewUser, Password, User, UserStatus};
