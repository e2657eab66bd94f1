//! The process-wide token signing secret.
//!
//! A [`SigningSecret`] is validated once when it is constructed and then
//! handed to the [`TokenCodec`](crate::codec::TokenCodec) by value. Nothing
//! caches it globally.

use std::fmt;
use std::str::FromStr;

use crate::error::SecretError;

/// Minimum secret length for HS256.
pub const MIN_SECRET_LEN: usize = 32;

/// Values shipped in sample configuration that must never reach production.
pub const KNOWN_PLACEHOLDERS: &[&str] = &["change-me-to-a-random-64-char-string"];

/// Deployment environment. Decides whether weak secrets are fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    Production,
    #[default]
    Development,
    Test,
}

impl Environment {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symmetric key for signing tokens.
#[derive(Clone)]
pub struct SigningSecret {
    bytes: Vec<u8>,
}

impl SigningSecret {
    /// Validate and wrap a secret.
    ///
    /// An empty secret is always refused. A placeholder or short secret is
    /// refused in production and logged as a warning elsewhere.
    pub fn new(raw: impl Into<String>, env: Environment) -> Result<Self, SecretError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(SecretError::Missing);
        }

        if KNOWN_PLACEHOLDERS.contains(&raw.as_str()) {
            if env.is_production() {
                return Err(SecretError::Placeholder);
            }
            tracing::warn!(
                env = %env,
                "JWT_SECRET is set to a placeholder value; change it before deploying"
            );
        }

        if raw.len() < MIN_SECRET_LEN {
            if env.is_production() {
                return Err(SecretError::TooShort {
                    len: raw.len(),
                    min: MIN_SECRET_LEN,
                });
            }
            tracing::warn!(
                env = %env,
                len = raw.len(),
                "JWT_SECRET is shorter than {} characters",
                MIN_SECRET_LEN
            );
        }

        Ok(Self {
            bytes: raw.into_bytes(),
        })
    }

    /// A random 64-character secret for tests and local tooling.
    pub fn generate() -> Self {
        use rand::distributions::{Alphanumeric, DistString};
        let raw = Alphanumeric.sample_string(&mut rand::thread_rng(), 64);
        Self {
            bytes: raw.into_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecret")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRONG: &str = "0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_empty_secret_is_always_refused() {
        for env in [Environment::Production, Environment::Development, Environment::Test] {
            assert_eq!(SigningSecret::new("", env).unwrap_err(), SecretError::Missing);
        }
    }

    #[test]
    fn test_production_rejects_placeholder_and_short() {
        let err = SigningSecret::new(KNOWN_PLACEHOLDERS[0], Environment::Production).unwrap_err();
        assert_eq!(err, SecretError::Placeholder);

        let err = SigningSecret::new("short", Environment::Production).unwrap_err();
        assert_eq!(err, SecretError::TooShort { len: 5, min: MIN_SECRET_LEN });

        assert!(SigningSecret::new(STRONG, Environment::Production).is_ok());
    }

    #[test]
    fn test_development_only_warns() {
        assert!(SigningSecret::new(KNOWN_PLACEHOLDERS[0], Environment::Development).is_ok());
        assert!(SigningSecret::new("short", Environment::Test).is_ok());
    }

    #[test]
    fn test_generated_secrets_differ() {
        let a = SigningSecret::generate();
        let b = SigningSecret::generate();
        assert_eq!(a.as_bytes().len(), 64);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_debug_does_not_leak() {
        let s = SigningSecret::new(STRONG, Environment::Test).unwrap();
        let rendered = format!("{:?}", s);
        assert!(!rendered.contains("0123"));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("PRODUCTION".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert!("staging".parse::<Environment>().is_err());
    }
}
