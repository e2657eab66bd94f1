//! Compact HS256 JSON Web Tokens.
//!
//! Tokens are `base64url(header).base64url(claims).base64url(hmac)` with no
//! padding. Only `HS256` is accepted; any other `alg`, including `none`, is
//! rejected before the signature is looked at.
//!
//! Every verification failure surfaces as the same
//! [`SessionError::InvalidToken`]. The concrete reason is logged at `debug`
//! and never returned.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use innera_core::UserId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Result, SessionError};
use crate::secret::SigningSecret;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// Which kind of token a claim set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Access,
    Refresh,
}

impl Audience {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Audience::Access => "access",
            Audience::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Registered and private claims carried by both token kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// A verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub user_id: UserId,
    pub email: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// A verified refresh token. Says nothing about whether it was revoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    pub user_id: UserId,
    pub jti: String,
}

/// Signs and verifies tokens with one secret and issuer.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    secret: SigningSecret,
    issuer: String,
}

impl TokenCodec {
    pub fn new(secret: SigningSecret, issuer: impl Into<String>) -> Self {
        Self {
            secret,
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serialize and sign a claim set.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header = serde_json::to_vec(&header).map_err(|e| SessionError::Encoding(e.to_string()))?;
        let payload = serde_json::to_vec(claims).map_err(|e| SessionError::Encoding(e.to_string()))?;

        let mut token = URL_SAFE_NO_PAD.encode(header);
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(payload));

        let signature = self.mac(token.as_bytes())?.finalize().into_bytes();
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(signature));
        Ok(token)
    }

    /// Verify signature, audience, issuer, and expiry as of `now` (Unix seconds).
    pub fn verify(&self, token: &str, audience: Audience, now: i64) -> Result<Claims> {
        self.check(token, audience, now).map_err(|reason| {
            tracing::debug!(reason, audience = audience.as_str(), "token rejected");
            SessionError::InvalidToken
        })
    }

    /// Verify an access token and extract its principal.
    pub fn verify_access(&self, token: &str, now: i64) -> Result<AccessClaims> {
        let claims = self.verify(token, Audience::Access, now)?;
        let user_id = parse_subject(&claims.sub)?;
        let email = claims
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| reject("missing email claim"))?;
        Ok(AccessClaims {
            user_id,
            email,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Verify a refresh token and extract its subject and id.
    pub fn verify_refresh(&self, token: &str, now: i64) -> Result<RefreshClaims> {
        let claims = self.verify(token, Audience::Refresh, now)?;
        let user_id = parse_subject(&claims.sub)?;
        let jti = claims
            .jti
            .filter(|j| !j.is_empty())
            .ok_or_else(|| reject("missing jti claim"))?;
        Ok(RefreshClaims { user_id, jti })
    }

    fn check(&self, token: &str, audience: Audience, now: i64) -> std::result::Result<Claims, &'static str> {
        let (signing_input, signature) = token.rsplit_once('.').ok_or("malformed")?;
        let (header, payload) = signing_input.split_once('.').ok_or("malformed")?;
        if payload.contains('.') {
            return Err("malformed");
        }

        let header: Header = decode_segment(header).ok_or("bad header")?;
        if header.alg != ALGORITHM {
            return Err("unsupported algorithm");
        }

        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| "bad signature encoding")?;
        self.mac(signing_input.as_bytes())
            .map_err(|_| "mac init")?
            .verify_slice(&signature)
            .map_err(|_| "signature mismatch")?;

        let claims: Claims = decode_segment(payload).ok_or("bad claims")?;
        if claims.aud != audience.as_str() {
            return Err("audience mismatch");
        }
        if claims.iss != self.issuer {
            return Err("issuer mismatch");
        }
        if claims.exp <= now {
            return Err("expired");
        }
        if claims.sub.is_empty() {
            return Err("missing sub claim");
        }
        Ok(claims)
    }

    fn mac(&self, input: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| SessionError::Encoding(e.to_string()))?;
        mac.update(input);
        Ok(mac)
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn parse_subject(sub: &str) -> Result<UserId> {
    sub.parse().map_err(|_| reject("subject is not a user id"))
}

fn reject(reason: &'static str) -> SessionError {
    tracing::debug!(reason, "token rejected");
    SessionError::InvalidToken
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::Environment;
    use proptest::prelude::*;

    const NOW: i64 = 1_700_000_000;

    fn codec(secret: &str) -> TokenCodec {
        TokenCodec::new(
            SigningSecret::new(secret, Environment::Test).unwrap(),
            "innera-api",
        )
    }

    fn access_claims(user: UserId) -> Claims {
        Claims {
            sub: user.to_string(),
            email: Some("u1@example.com".into()),
            aud: "access".into(),
            iss: "innera-api".into(),
            iat: NOW,
            exp: NOW + 900,
            jti: None,
        }
    }

    fn refresh_claims(user: UserId, jti: &str) -> Claims {
        Claims {
            sub: user.to_string(),
            email: None,
            aud: "refresh".into(),
            iss: "innera-api".into(),
            iat: NOW,
            exp: NOW + 60,
            jti: Some(jti.into()),
        }
    }

    fn assert_invalid(r: Result<impl std::fmt::Debug>) {
        match r {
            Err(SessionError::InvalidToken) => {}
            other => panic!("expected InvalidToken, got {:?}", other),
        }
    }

    #[test]
    fn test_sign_and_verify_access() {
        let c = codec("an-adequately-long-signing-secret-value");
        let user = UserId::new();
        let token = c.sign(&access_claims(user)).unwrap();
        assert_eq!(token.matches('.').count(), 2);

        let verified = c.verify_access(&token, NOW + 1).unwrap();
        assert_eq!(verified.user_id, user);
        assert_eq!(verified.email, "u1@example.com");
        assert_eq!(verified.expires_at - verified.issued_at, 900);
    }

    #[test]
    fn test_refresh_requires_jti() {
        let c = codec("an-adequately-long-signing-secret-value");
        let user = UserId::new();

        let token = c.sign(&refresh_claims(user, "j1")).unwrap();
        let verified = c.verify_refresh(&token, NOW).unwrap();
        assert_eq!(verified.jti, "j1");

        let token = c.sign(&refresh_claims(user, "")).unwrap();
        assert_invalid(c.verify_refresh(&token, NOW));
    }

    #[test]
    fn test_audiences_do_not_cross() {
        let c = codec("an-adequately-long-signing-secret-value");
        let user = UserId::new();
        let refresh = c.sign(&refresh_claims(user, "j1")).unwrap();
        let access = c.sign(&access_claims(user)).unwrap();
        assert_invalid(c.verify_access(&refresh, NOW));
        assert_invalid(c.verify_refresh(&access, NOW));
    }

    #[test]
    fn test_expiry_is_exclusive() {
        let c = codec("an-adequately-long-signing-secret-value");
        let token = c.sign(&access_claims(UserId::new())).unwrap();
        assert!(c.verify_access(&token, NOW + 899).is_ok());
        assert_invalid(c.verify_access(&token, NOW + 900));
    }

    #[test]
    fn test_rejections_are_indistinguishable() {
        let c = codec("an-adequately-long-signing-secret-value");
        let other = codec("a-completely-different-signing-secret");
        let user = UserId::new();
        let good = c.sign(&access_claims(user)).unwrap();

        let mut tampered_claims = access_claims(user);
        tampered_claims.email = Some("attacker@example.com".into());
        let forged_payload = other.sign(&tampered_claims).unwrap();
        let mut parts: Vec<&str> = good.split('.').collect();
        let forged_mid = forged_payload.split('.').nth(1).unwrap().to_string();
        parts[1] = &forged_mid;
        let tampered = parts.join(".");

        let mut wrong_issuer = access_claims(user);
        wrong_issuer.iss = "someone-else".into();

        let none_alg = format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
            good.split('.').nth(1).unwrap()
        );

        let cases = [
            c.verify_access(&tampered, NOW).map(|_| ()),
            other.verify_access(&good, NOW).map(|_| ()),
            c.verify_access(&good, NOW + 10_000).map(|_| ()),
            c.verify_access(&c.sign(&wrong_issuer).unwrap(), NOW).map(|_| ()),
            c.verify_access(&none_alg, NOW).map(|_| ()),
            c.verify_access("not-a-token", NOW).map(|_| ()),
        ];
        let messages: Vec<String> = cases
            .into_iter()
            .map(|r| r.unwrap_err().to_string())
            .collect();
        assert!(messages.iter().all(|m| m == "invalid or expired token"), "{:?}", messages);
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let c = codec("an-adequately-long-signing-secret-value");
        let mut claims = access_claims(UserId::new());
        claims.sub = "not-a-uuid".into();
        let token = c.sign(&claims).unwrap();
        assert!(c.verify(&token, Audience::Access, NOW).is_ok());
        assert_invalid(c.verify_access(&token, NOW));
    }

    proptest! {
        #[test]
        fn prop_garbage_never_verifies(s in "[A-Za-z0-9_.-]{0,200}") {
            let c = codec("an-adequately-long-signing-secret-value");
            prop_assert!(c.verify(&s, Audience::Access, NOW).is_err());
            prop_assert!(c.verify(&s, Audience::Refresh, NOW).is_err());
        }
    }
}
