// Wallet auth - identity backend
//
// Phone based signup, password recovery and sessions. Signup and recovery
// share one confirmation engine (domains/confirmation); sessions have three
// storage backends (domains/sessions).

pub mod common;
pub mod config;
pub mod db;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
