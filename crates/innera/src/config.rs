//! Runtime configuration.
//!
//! [`InneraConfig::from_env`] reads the process environment once at startup.
//! The signing secret is validated while loading, so a bad secret in
//! production stops the process before anything is served.

use std::path::PathBuf;
use std::time::Duration;

use innera_session::{Environment, SecretError, SessionConfig, SigningSecret};
use thiserror::Error;

/// Partner invite codes live 24 hours.
pub const PARTNER_INVITE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default upper bound on ACTIVE members per circle.
pub const DEFAULT_MAX_CIRCLE_MEMBERS: u32 = 20;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("JWT_SECRET rejected: {0}")]
    Secret(#[from] SecretError),
}

/// Expiry and capacity of a circle invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvitePolicy {
    pub ttl: Duration,
    pub max_uses: u32,
}

impl InvitePolicy {
    /// The invite created alongside a new circle.
    pub const FOUNDING: InvitePolicy = InvitePolicy {
        ttl: Duration::from_secs(30 * 24 * 60 * 60),
        max_uses: 100,
    };

    /// Invites generated later by the owner.
    pub const AD_HOC: InvitePolicy = InvitePolicy {
        ttl: Duration::from_secs(7 * 24 * 60 * 60),
        max_uses: 50,
    };
}

/// Everything the coordinators need to know about the deployment.
#[derive(Debug, Clone)]
pub struct InneraConfig {
    pub environment: Environment,
    pub secret: SigningSecret,
    pub session: SessionConfig,
    /// SQLite database file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    pub partner_invite_ttl: Duration,
    pub founding_invite: InvitePolicy,
    pub ad_hoc_invite: InvitePolicy,
    pub max_circle_members: u32,
}

impl InneraConfig {
    /// Load from the process environment.
    ///
    /// | Variable                         | Default        |
    /// |----------------------------------|----------------|
    /// | `INNERA_ENV`                     | `development`  |
    /// | `JWT_SECRET`                     | required       |
    /// | `INNERA_ISSUER`                  | `innera-api`   |
    /// | `INNERA_DATABASE_PATH`           | in memory      |
    /// | `INNERA_ACCESS_TTL_SECS`         | 900            |
    /// | `INNERA_REFRESH_TTL_SECS`        | 2592000        |
    /// | `INNERA_PARTNER_INVITE_TTL_SECS` | 86400          |
    /// | `INNERA_MAX_CIRCLE_MEMBERS`      | 20             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("INNERA_ENV") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                var: "INNERA_ENV",
                value: raw.clone(),
                reason,
            })?,
            None => Environment::Development,
        };

        let raw_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let secret = SigningSecret::new(raw_secret, environment)?;

        let mut session = SessionConfig::new();
        if let Some(issuer) = lookup("INNERA_ISSUER") {
            session = session.with_issuer(issuer);
        }
        if let Some(ttl) = seconds(&lookup, "INNERA_ACCESS_TTL_SECS")? {
            session = session.with_access_ttl(ttl);
        }
        if let Some(ttl) = seconds(&lookup, "INNERA_REFRESH_TTL_SECS")? {
            session = session.with_refresh_ttl(ttl);
        }

        let partner_invite_ttl =
            seconds(&lookup, "INNERA_PARTNER_INVITE_TTL_SECS")?.unwrap_or(PARTNER_INVITE_TTL);
        let max_circle_members = match lookup("INNERA_MAX_CIRCLE_MEMBERS") {
            Some(raw) => parse_positive(&raw, "INNERA_MAX_CIRCLE_MEMBERS")?,
            None => DEFAULT_MAX_CIRCLE_MEMBERS,
        };

        let config = Self {
            environment,
            secret,
            session,
            database_path: lookup("INNERA_DATABASE_PATH").map(PathBuf::from),
            partner_invite_ttl,
            founding_invite: InvitePolicy::FOUNDING,
            ad_hoc_invite: InvitePolicy::AD_HOC,
            max_circle_members,
        };
        tracing::debug!(
            env = %config.environment,
            issuer = %config.session.issuer,
            database = ?config.database_path,
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn with_secret(mut self, secret: SigningSecret) -> Self {
        self.secret = secret;
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn with_max_circle_members(mut self, max: u32) -> Self {
        self.max_circle_members = max;
        self
    }
}

impl Default for InneraConfig {
    /// In-memory test configuration with a random secret.
    fn default() -> Self {
        Self {
            environment: Environment::Test,
            secret: SigningSecret::generate(),
            session: SessionConfig::new(),
            database_path: None,
            partner_invite_ttl: PARTNER_INVITE_TTL,
            founding_invite: InvitePolicy::FOUNDING,
            ad_hoc_invite: InvitePolicy::AD_HOC,
            max_circle_members: DEFAULT_MAX_CIRCLE_MEMBERS,
        }
    }
}

fn seconds<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|raw| parse_positive::<u64>(&raw, var).map(Duration::from_secs))
        .transpose()
}

fn parse_positive<T>(raw: &str, var: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value: T = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(value)
}
