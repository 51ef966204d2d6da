//! Random verification codes and finish tokens.

use rand::distributions::Alphanumeric;
use rand::Rng;

use super::traits::BaseCodeGenerator;

pub const DEFAULT_CODE_LEN: usize = 6;
pub const DEFAULT_CODE_ALPHABET: &str = "1234567890";
pub const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct RandomGenerator {
    code_len: usize,
    alphabet: Vec<char>,
}

impl RandomGenerator {
    /// An empty alphabet falls back to digits.
    pub fn new(code_len: usize, alphabet: &str) -> Self {
        let mut alphabet: Vec<char> = alphabet.chars().collect();
        if alphabet.is_empty() {
            alphabet = DEFAULT_CODE_ALPHABET.chars().collect();
        }
        Self {
            code_len: code_len.max(1),
            alphabet,
        }
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LEN, DEFAULT_CODE_ALPHABET)
    }
}

impl BaseCodeGenerator for RandomGenerator {
    fn random_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.code_len)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }

    fn random_token(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect()
    }
}
