//! Request-boundary adapters.
//!
//! One function per exposed endpoint. Bodies arrive already shape-validated;
//! these functions call the coordinators and translate the outcome into a
//! status code and a JSON-ready body. Server failures are logged with a
//! fresh correlation id and reported without internals.

use std::future::Future;
use std::time::Duration;

use innera_core::{
    Circle, Entry, EntryId, EntryPatch, ErrorKind, HistoryPolicy, LinkId, LinkStatus, Principal,
    User,
};
use innera_store::{KvStore, Store, StoreExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::Innera;
use crate::error::{InneraError, Result};
use crate::pairing::{PartnerInvite, PartnerView};

/// A successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status: u16,
    /// `None` for `204 No Content`.
    pub body: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    pub fn created(body: T) -> Self {
        Self {
            status: 201,
            body: Some(body),
        }
    }
}

impl ApiResponse<()> {
    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }
}

/// A failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
    /// Present on 5xx only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl From<InneraError> for ApiError {
    fn from(err: InneraError) -> Self {
        let kind = err.kind();
        if kind.is_server_error() {
            let correlation_id = Uuid::new_v4().to_string();
            tracing::error!(correlation_id = %correlation_id, error = %err, "request failed");
            return ApiError {
                status: kind.status(),
                code: kind.code(),
                message: "An unexpected error occurred".to_string(),
                correlation_id: Some(correlation_id),
            };
        }

        let message = match kind {
            ErrorKind::Unauthorized => "Invalid or expired token".to_string(),
            ErrorKind::Conflict if !err.to_string().contains("retry") => {
                format!("{}; refresh and retry", err)
            }
            _ => err.to_string(),
        };
        ApiError {
            status: kind.status(),
            code: kind.code(),
            message,
            correlation_id: None,
        }
    }
}

pub type ApiResult<T> = std::result::Result<ApiResponse<T>, ApiError>;

/// Bound a call by `deadline`.
///
/// On expiry the future is dropped and the caller gets `Internal`. Store work
/// already handed to a blocking task still runs to completion, and its
/// transaction either commits or rolls back as a whole.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(deadline_ms = deadline.as_millis() as u64, "request deadline exceeded");
            Err(InneraError::DeadlineExceeded)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: User,
}

/// `POST /auth/refresh`: rotate the refresh token and issue a new pair.
pub async fn refresh<S: Store, K: KvStore + 'static>(
    app: &Innera<S, K>,
    body: RefreshRequest,
) -> ApiResult<SessionResponse> {
    let run = async {
        let user_id = app.tokens().redeem_refresh(&body.refresh_token).await?;
        let user = app
            .store()
            .get_user(user_id)
            .await?
            .ok_or_else(|| InneraError::Unauthorized("user no longer exists".into()))?;
        let pair = app.tokens().issue_pair(&user.principal()).await?;
        Ok::<_, InneraError>(SessionResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
            user,
        })
    };
    Ok(ApiResponse::ok(run.await?))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// `POST /auth/logout`: revoke the presented refresh token.
pub async fn logout<S: Store, K: KvStore + 'static>(
    app: &Innera<S, K>,
    principal: &Principal,
    body: LogoutRequest,
) -> ApiResult<()> {
    let claims = app.tokens().verify_refresh(&body.refresh_token).map_err(InneraError::from)?;
    if claims.user_id != principal.user_id {
        return Err(InneraError::Unauthorized("token subject mismatch".into()).into());
    }
    app.tokens()
        .revoke_one(claims.user_id, &claims.jti)
        .await
        .map_err(InneraError::from)?;
    Ok(ApiResponse::no_content())
}

/// `POST /auth/logout-all`: revoke every refresh token of the principal.
pub async fn logout_all<S: Store, K: KvStore + 'static>(
    app: &Innera<S, K>,
    principal: &Principal,
) -> ApiResult<()> {
    app.tokens()
        .revoke_all(principal.user_id)
        .await
        .map_err(InneraError::from)?;
    Ok(ApiResponse::no_content())
}

// ─────────────────────────────────────────────────────────────────────────────
// Partner
// ─────────────────────────────────────────────────────────────────────────────

/// `POST /partner/invite`
pub async fn create_partner_invite<S: Store, K: KvStore + 'static>(
    app: &Innera<S, K>,
    principal: &Principal,
) -> ApiResult<PartnerInvite> {
    let invite = app.pairing().create_invite(principal.user_id).await?;
    Ok(ApiResponse::created(invite))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub id: LinkId,
    pub status: LinkStatus,
}

/// `POST /partner/invite/:code/accept`
pub async fn accept_partner_invite<S: Store, K: KvStore + 'static>(
    app: &Innera<S, K>,
    principal: &Principal,
    code: &str,
) -> ApiResult<LinkResponse> {
    let link = app.pairing().accept_invite(principal.user_id, code).await?;
    Ok(ApiResponse::ok(LinkResponse {
        id: link.id,
        status: link.status,
    }))
}

/// `GET /partner`: the caller's open link, or `null`.
pub async fn current_partner<S: Store, K: KvStore + 'static>(
    app: &Innera<S, K>,
    principal: &Principal,
) -> ApiResult<Option<PartnerView>> {
    let view = app.pairing().current(principal.user_id).await?;
    Ok(ApiResponse::ok(view))
}

// ─────────────────────────────────────────────────────────────────────────────
// Circles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCircleRequest {
    pub invite_code: String,
    #[serde(default)]
    pub history_policy: Option<HistoryPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCircleResponse {
    pub circle: Circle,
}

/// `POST /circles/join`. History policy defaults to `ALL`.
pub async fn join_circle<S: Store, K: KvStore + 'static>(
    app: &Innera<S, K>,
    principal: &Principal,
    body: JoinCircleRequest,
) -> ApiResult<JoinCircleResponse> {
    let joined = app
        .circles()
        .join_by_code(
            principal.user_id,
            &body.invite_code,
            body.history_policy.unwrap_or(HistoryPolicy::All),
        )
        .await?;
    Ok(ApiResponse::created(JoinCircleResponse {
        circle: joined.circle,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Entries
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchEntryRequest {
    pub version: i64,
    #[serde(flatten)]
    pub patch: EntryPatch,
}

/// `PATCH /entries/:id`
pub async fn patch_entry<S: Store, K: KvStore + 'static>(
    app: &Innera<S, K>,
    principal: &Principal,
    entry_id: EntryId,
    body: PatchEntryRequest,
) -> ApiResult<Entry> {
    let entry = app
        .entries()
        .update(entry_id, principal.user_id, body.version, body.patch)
        .await?;
    Ok(ApiResponse::ok(entry))
}
