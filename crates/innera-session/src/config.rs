//! Token lifetimes and revocation limits.

use std::time::Duration;

/// Default token issuer.
pub const DEFAULT_ISSUER: &str = "innera-api";

/// Access tokens live 15 minutes.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Refresh tokens live 30 days.
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Settings for [`TokenService`](crate::service::TokenService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Keys requested per scan page during revoke-all.
    pub revoke_scan_batch: usize,
    /// Safety valve on scan pages during revoke-all.
    pub revoke_max_iterations: usize,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            access_ttl: ACCESS_TOKEN_TTL,
            refresh_ttl: REFRESH_TOKEN_TTL,
            revoke_scan_batch: 100,
            revoke_max_iterations: 100,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn with_revoke_limits(mut self, batch: usize, max_iterations: usize) -> Self {
        self.revoke_scan_batch = batch.max(1);
        self.revoke_max_iterations = max_iterations.max(1);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
