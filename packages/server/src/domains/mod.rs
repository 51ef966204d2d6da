// Business domains
pub mod auth;
pub mod confirmation;
pub mod sessions;
pub mod user;
