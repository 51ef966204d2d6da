//! Phone numbers as identities.
//!
//! Only a minimal canonical form is enforced: separators are stripped and the
//! result must be `+` followed by 10 to 15 digits.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone is empty")]
    Empty,

    #[error("phone must start with '+'")]
    MissingPlus,

    #[error("phone contains invalid character '{0}'")]
    InvalidCharacter(char),

    #[error("phone must have between 10 and 15 digits, got {0}")]
    InvalidLength(usize),
}

/// A canonical phone number (`+` and digits only)
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct Phone(String);

impl Phone {
    pub fn parse(raw: &str) -> Result<Self, PhoneError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PhoneError::Empty);
        }

        let mut canonical = String::with_capacity(trimmed.len());
        for (i, c) in trimmed.chars().enumerate() {
            match c {
                '+' if i == 0 => canonical.push(c),
                '0'..='9' => canonical.push(c),
                ' ' | '-' | '(' | ')' => {}
                other => return Err(PhoneError::InvalidCharacter(other)),
            }
        }

        if !canonical.starts_with('+') {
            return Err(PhoneError::MissingPlus);
        }

        let digits = canonical.len() - 1;
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits) {
            return Err(PhoneError::InvalidLength(digits));
        }

        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 of the canonical form, hex encoded
    pub fn hashed(&self) -> String {
        hash_phone_number(&self.0)
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Phone {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Phone {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Phone::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

/// Hash a phone number with SHA-256 so it can be used in keys without
/// exposing the raw number.
pub fn hash_phone_number(phone_number: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(phone_number.as_bytes());
    format!("{:x}", hasher.finalize())
}
