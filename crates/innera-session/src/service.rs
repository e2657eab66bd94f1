//! Token issuance, single-use rotation, and revocation.

use std::sync::Arc;

use chrono::Utc;
use innera_core::{Principal, UserId};
use innera_store::KvStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{AccessClaims, Audience, Claims, RefreshClaims, TokenCodec};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::registry::{RevocationRegistry, RevokeAllReport};
use crate::secret::SigningSecret;

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
}

/// Issues and checks session credentials.
///
/// Access tokens are verified without touching the store. Refresh tokens are
/// single use: [`TokenService::atomic_rotate`] removes the record and reports
/// whether it existed, so of two racing refreshes exactly one wins.
pub struct TokenService<K> {
    codec: TokenCodec,
    registry: RevocationRegistry<K>,
    config: SessionConfig,
}

impl<K: KvStore> TokenService<K> {
    pub fn new(secret: SigningSecret, config: SessionConfig, kv: Arc<K>) -> Self {
        let codec = TokenCodec::new(secret, config.issuer.clone());
        let registry = RevocationRegistry::new(kv, config.refresh_ttl)
            .with_scan_limits(config.revoke_scan_batch, config.revoke_max_iterations);
        Self {
            codec,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn registry(&self) -> &RevocationRegistry<K> {
        &self.registry
    }

    /// Sign a new pair and record the refresh token's id.
    pub async fn issue_pair(&self, user: &Principal) -> Result<TokenPair> {
        let now = Utc::now().timestamp();
        let access_ttl = self.config.access_ttl.as_secs();
        let refresh_ttl = self.config.refresh_ttl.as_secs();
        let jti = Uuid::new_v4().to_string();

        let access_token = self.codec.sign(&Claims {
            sub: user.user_id.to_string(),
            email: Some(user.email.clone()),
            aud: Audience::Access.as_str().to_string(),
            iss: self.config.issuer.clone(),
            iat: now,
            exp: now + to_i64(access_ttl),
            jti: None,
        })?;
        let refresh_token = self.codec.sign(&Claims {
            sub: user.user_id.to_string(),
            email: None,
            aud: Audience::Refresh.as_str().to_string(),
            iss: self.config.issuer.clone(),
            iat: now,
            exp: now + to_i64(refresh_ttl),
            jti: Some(jti.clone()),
        })?;

        self.registry.register(user.user_id, &jti).await?;
        tracing::info!(user_id = %user.user_id, "token pair issued");

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: access_ttl,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        self.codec.verify_access(token, Utc::now().timestamp())
    }

    /// Checks the token itself only. Revocation is decided by
    /// [`atomic_rotate`](Self::atomic_rotate).
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        self.codec.verify_refresh(token, Utc::now().timestamp())
    }

    /// Remove the refresh record, reporting whether it was still live.
    pub async fn atomic_rotate(&self, user: UserId, jti: &str) -> Result<bool> {
        self.registry.consume(user, jti).await
    }

    /// Verify a refresh token and consume it.
    ///
    /// Returns the subject on success. A token that verifies but was already
    /// rotated or revoked fails with [`SessionError::AlreadyRevoked`]; the
    /// record is never put back.
    pub async fn redeem_refresh(&self, token: &str) -> Result<UserId> {
        let claims = self.verify_refresh(token)?;
        if !self.atomic_rotate(claims.user_id, &claims.jti).await? {
            tracing::debug!(user_id = %claims.user_id, "refresh token replayed or revoked");
            return Err(SessionError::AlreadyRevoked);
        }
        Ok(claims.user_id)
    }

    /// Logout of one session. Missing records are fine.
    pub async fn revoke_one(&self, user: UserId, jti: &str) -> Result<()> {
        self.registry.revoke(user, jti).await
    }

    /// Logout of every session the scan reaches.
    pub async fn revoke_all(&self, user: UserId) -> Result<RevokeAllReport> {
        self.registry.revoke_all(user).await
    }
}

fn to_i64(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX / 2)
}
