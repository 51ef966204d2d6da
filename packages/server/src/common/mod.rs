pub mod errors;
pub mod phone;

pub use errors::*;
pub use phone::{hash_phone_number, Phone, PhoneError};
