use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use jsonwebtoken::Algorithm;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use twilio::TwilioOptions;

use crate::domains::sessions::factory::parse_jwt_method;
use crate::domains::sessions::SessionKind;
use crate::kernel::generator::{DEFAULT_CODE_ALPHABET, DEFAULT_CODE_LEN};

/// `DATABASE_URL` value selecting the in-process user store
pub const MEMORY_DATABASE_URL: &str = "mem://";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub storage_url: String,
    pub port: u16,
    pub auth: AuthSettings,
    pub generator: GeneratorSettings,
    pub notifier: NotifierSettings,
}

/// Session and confirmation flow settings
#[derive(Clone)]
pub struct AuthSettings {
    /// Scheme expected in `Authorization: <token_name> <token>`
    pub token_name: String,
    pub token_ttl: Duration,
    pub session_kind: SessionKind,
    pub jwt_secret: Option<String>,
    pub jwt_algorithm: Algorithm,
    pub jwt_issuer: Option<String>,
    /// Lifetime of verification codes and finish tokens
    pub signup_ttl: Duration,
    /// Minimum delay between two Start calls, `None` disables the throttle
    pub retry_delay: Option<Duration>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_name: "Bearer".to_string(),
            token_ttl: Duration::from_secs(24 * 60 * 60),
            session_kind: SessionKind::Mem,
            jwt_secret: None,
            jwt_algorithm: Algorithm::HS256,
            jwt_issuer: None,
            signup_ttl: Duration::from_secs(24 * 60 * 60),
            retry_delay: Some(Duration::from_secs(60)),
        }
    }
}

// Keep the secret out of logs
impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("token_name", &self.token_name)
            .field("token_ttl", &self.token_ttl)
            .field("session_kind", &self.session_kind)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "***"))
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("signup_ttl", &self.signup_ttl)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSettings {
    pub code_len: usize,
    pub code_alphabet: String,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            code_len: DEFAULT_CODE_LEN,
            code_alphabet: DEFAULT_CODE_ALPHABET.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum NotifierSettings {
    Log,
    Twilio(TwilioOptions),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let jwt_method = env::var("JWT_METHOD").unwrap_or_else(|_| "HS256".to_string());
        let session_kind = env::var("AUTH_TOKEN_STORAGE")
            .unwrap_or_else(|_| "mem".to_string())
            .parse::<SessionKind>()
            .context("AUTH_TOKEN_STORAGE must be mem, stateless or stateless+revocable")?;

        let auth = AuthSettings {
            token_name: env::var("AUTH_TOKEN_NAME").unwrap_or_else(|_| "Bearer".to_string()),
            token_ttl: Duration::from_secs(parse_var("AUTH_TOKEN_EXPIRE_SECS", 86400)?),
            session_kind,
            jwt_secret: env::var("JWT_SECRET").ok(),
            jwt_algorithm: parse_jwt_method(&jwt_method).context("JWT_METHOD is invalid")?,
            jwt_issuer: env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty()),
            signup_ttl: Duration::from_secs(parse_var("AUTH_SIGNUP_TOKEN_EXPIRE_SECS", 86400)?),
            retry_delay: match parse_var::<u64>("AUTH_RETRY_DELAY_SECS", 60)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        };

        if auth.session_kind != SessionKind::Mem && auth.jwt_secret.is_none() {
            bail!("JWT_SECRET must be set when AUTH_TOKEN_STORAGE is {}", auth.session_kind);
        }

        let generator = GeneratorSettings {
            code_len: parse_var("GENERATOR_CODE_LEN", DEFAULT_CODE_LEN)?,
            code_alphabet: env::var("GENERATOR_CODE_ALPHABET")
                .unwrap_or_else(|_| DEFAULT_CODE_ALPHABET.to_string()),
        };

        let notifier = match env::var("NOTIFIER").unwrap_or_else(|_| "log".to_string()).as_str() {
            "log" => NotifierSettings::Log,
            "twilio" => NotifierSettings::Twilio(TwilioOptions {
                account_sid: env::var("TWILIO_ACCOUNT_SID")
                    .context("TWILIO_ACCOUNT_SID must be set")?,
                auth_token: env::var("TWILIO_AUTH_TOKEN")
                    .context("TWILIO_AUTH_TOKEN must be set")?,
                from: env::var("TWILIO_FROM_NUMBER").context("TWILIO_FROM_NUMBER must be set")?,
            }),
            other => bail!("NOTIFIER must be log or twilio, got '{}'", other),
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            storage_url: env::var("STORAGE_URL").unwrap_or_else(|_| "mem://".to_string()),
            port: parse_var("PORT", 9999)?,
            auth,
            generator,
            notifier,
        })
    }

    pub fn uses_memory_database(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_defaults() {
        let auth = AuthSettings::default();
        assert_eq!(auth.token_name, "Bearer");
        assert_eq!(auth.token_ttl, Duration::from_secs(86400));
        assert_eq!(auth.signup_ttl, Duration::from_secs(86400));
        assert_eq!(auth.retry_delay, Some(Duration::from_secs(60)));
        assert_eq!(auth.session_kind, SessionKind::Mem);
    }

    #[test]
    fn test_debug_hides_secret() {
        let auth = AuthSettings {
            jwt_secret: Some("super-secret".to_string()),
            ..AuthSettings::default()
        };
        let printed = format!("{:?}", auth);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn test_parse_var_default_and_error() {
        assert_eq!(
            parse_var::<u16>("WALLET_AUTH_TEST_UNSET_PORT", 9999).unwrap(),
            9999
        );

        env::set_var("WALLET_AUTH_TEST_BAD_PORT", "ninety");
        assert!(parse_var::<u16>("WALLET_AUTH_TEST_BAD_PORT", 9999).is_err());
        env::remove_var("WALLET_AUTH_TEST_BAD_PORT");
    }

    #[test]
    fn test_generator_defaults() {
        let generator = GeneratorSettings::default();
        assert_eq!(generator.code_len, 6);
        assert_eq!(generator.code_alphabet, "1234567890");
    }
}
