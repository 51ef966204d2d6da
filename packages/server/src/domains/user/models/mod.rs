pub mod password;
pub mod user;

pub use password::Password;
pub use user::{NewUser, User, UserStatus};
