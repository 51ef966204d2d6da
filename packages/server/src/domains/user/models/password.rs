use anyhow::{anyhow, Result};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use serde::{Deserialize, Serialize};

/// Argon2id hash of a user password in PHC string format
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct Password(String);

impl Password {
    pub fn hash(raw: &str) -> Result<Self> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = Argon2::default()
            .hash_password(raw.as_bytes(), &salt)
            .map_err(|e| anyhow!("failed to hash password: {}", e))?;
        Ok(Self(hash.to_string()))
    }

    /// Whether `raw` matches this hash. A corrupt hash never matches.
    pub fn verify(&self, raw: &str) -> bool {
        match PasswordHash::new(&self.0) {
            Ok(parsed) => Argon2::default()
                .verify_password(raw.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    pub fn as_phc(&self) -> &str {
        &self.0
    }
}

// Never print hashes
impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}
