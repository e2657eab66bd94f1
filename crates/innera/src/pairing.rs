//! Partner pairing.
//!
//! A user creates a single-use invite code that lives in the key-value store
//! for 24 hours. Redeeming it forms an ACTIVE link in one step. Two keys are
//! involved:
//!
//! - `partner_invite:{code}` holds the inviter's id.
//! - `partner_pending_invite:{user}` is taken with create-if-absent and
//!   limits each user to one outstanding code.
//!
//! The `get_del` on the code is what makes redemption single use. Everything
//! after it runs in one relational transaction; if that transaction fails,
//! the code is put back with the TTL it had left before it was consumed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use innera_core::{
    LinkId, LinkRole, LinkStatus, Notification, NotificationKind, PartnerLink, UserId,
};
use innera_store::{KvStore, Store, StoreError, StoreExt, StoreTx};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{InneraError, Result};
use crate::notify::{dispatch, Notifier};

pub const INVITE_PREFIX: &str = "partner_invite:";
pub const PENDING_INVITE_PREFIX: &str = "partner_pending_invite:";

/// A freshly created invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerInvite {
    pub invite_code: String,
    /// Seconds until the code expires.
    pub expires_in: u64,
}

/// The caller's current link as they see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerView {
    pub id: LinkId,
    pub status: LinkStatus,
    pub role: LinkRole,
    pub partner_id: UserId,
    pub initiated_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Result of the acceptance transaction.
enum Acceptance {
    Linked(PartnerLink),
    AcceptorLinked,
    InviterLinked,
}

/// Drives the partner invite lifecycle.
pub struct PairingCoordinator<S, K> {
    store: Arc<S>,
    kv: Arc<K>,
    notifier: Arc<dyn Notifier>,
    invite_ttl: Duration,
}

impl<S: Store, K: KvStore> PairingCoordinator<S, K> {
    pub fn new(store: Arc<S>, kv: Arc<K>, notifier: Arc<dyn Notifier>, invite_ttl: Duration) -> Self {
        Self {
            store,
            kv,
            notifier,
            invite_ttl,
        }
    }

    fn invite_key(code: &str) -> String {
        format!("{}{}", INVITE_PREFIX, code)
    }

    fn pending_key(user: UserId) -> String {
        format!("{}{}", PENDING_INVITE_PREFIX, user)
    }

    /// Issue an invite code for `user`.
    ///
    /// Fails with `Conflict` if the user already has a PENDING or ACTIVE link
    /// or an outstanding code.
    pub async fn create_invite(&self, user: UserId) -> Result<PartnerInvite> {
        if self.store.open_link_for(user).await?.is_some() {
            return Err(InneraError::conflict(
                "You already have an active or pending partner link",
            ));
        }

        let code = crate::generate_code();
        let pending = Self::pending_key(user);
        if !self.kv.set_if_absent(&pending, &code, self.invite_ttl).await? {
            return Err(InneraError::conflict("You already have a pending partner invite"));
        }

        let inviter = user.to_string();
        if let Err(e) = self
            .kv
            .set(&Self::invite_key(&code), &inviter, self.invite_ttl)
            .await
        {
            if let Err(cleanup) = self.kv.del(&pending).await {
                tracing::warn!(user_id = %user, error = %cleanup, "failed to release pending invite guard");
            }
            return Err(e.into());
        }

        tracing::debug!(user_id = %user, "partner invite created");
        Ok(PartnerInvite {
            invite_code: code,
            expires_in: self.invite_ttl.as_secs(),
        })
    }

    /// Redeem `code` as `user`, forming an ACTIVE link with the inviter.
    pub async fn accept_invite(&self, user: UserId, code: &str) -> Result<PartnerLink> {
        let key = Self::invite_key(code);

        let peeked = self
            .kv
            .get(&key)
            .await?
            .ok_or_else(|| InneraError::not_found("Invite code not found or expired"))?;
        let inviter = parse_inviter(&peeked)?;
        if inviter == user {
            return Err(InneraError::bad_request("You cannot accept your own invite"));
        }

        let remaining = self.kv.ttl(&key).await?;
        let read_at = Instant::now();

        let consumed = self
            .kv
            .get_del(&key)
            .await?
            .ok_or_else(|| InneraError::not_found("Invite code not found or expired"))?;
        let inviter = parse_inviter(&consumed)?;

        let now = Utc::now();
        let outcome = self
            .store
            .transaction(move |tx| link_in_tx(tx, inviter, user, now))
            .await;

        match outcome {
            Ok(Acceptance::Linked(link)) => {
                if let Err(e) = self.kv.del(&Self::pending_key(inviter)).await {
                    tracing::warn!(user_id = %inviter, error = %e, "failed to clear pending invite guard");
                }
                tracing::info!(
                    link_id = %link.id,
                    initiator_id = %inviter,
                    partner_id = %user,
                    "partner link created"
                );
                dispatch(
                    &self.notifier,
                    Notification::new(inviter, NotificationKind::PartnerAccepted, "Partner request accepted", now)
                        .with_body("Your partner invite has been accepted!")
                        .with_data(serde_json::json!({ "linkId": link.id }).to_string()),
                );
                Ok(link)
            }
            Ok(Acceptance::AcceptorLinked) => {
                self.restore(&key, &consumed, remaining, read_at).await;
                Err(InneraError::conflict(
                    "You already have an active or pending partner link",
                ))
            }
            Ok(Acceptance::InviterLinked) => {
                // The code can never succeed again; drop it and free the inviter.
                if let Err(e) = self.kv.del(&Self::pending_key(inviter)).await {
                    tracing::warn!(user_id = %inviter, error = %e, "failed to clear pending invite guard");
                }
                Err(InneraError::conflict(
                    "The inviting user already has an active or pending partner link",
                ))
            }
            Err(e) => {
                self.restore(&key, &consumed, remaining, read_at).await;
                Err(e)
            }
        }
    }

    /// Put a consumed code back. Failure here is logged and the caller's
    /// original error wins.
    async fn restore(&self, key: &str, inviter: &str, remaining: Option<Duration>, read_at: Instant) {
        let Some(ttl) = restored_ttl(remaining, read_at.elapsed(), self.invite_ttl) else {
            tracing::debug!("partner invite code expired while consumed, not restored");
            return;
        };
        match self.kv.set(key, inviter, ttl).await {
            Ok(()) => tracing::debug!(ttl_secs = ttl.as_secs(), "partner invite code restored"),
            Err(e) => tracing::warn!(error = %e, "failed to restore partner invite code"),
        }
    }

    /// Accept or decline the PENDING link where `user` is the invited party.
    pub async fn respond(&self, user: UserId, accept: bool) -> Result<PartnerLink> {
        let to = if accept {
            LinkStatus::Active
        } else {
            LinkStatus::Declined
        };
        let now = Utc::now();

        let link = self
            .store
            .transaction(move |tx| -> Result<PartnerLink> {
                let link = tx
                    .open_link_for(user)?
                    .filter(|l| l.status == LinkStatus::Pending && l.partner_id == user)
                    .ok_or_else(|| InneraError::not_found("No pending partner request found"))?;
                if tx.transition_link(link.id, LinkStatus::Pending, to, user, now)? == 0 {
                    return Err(InneraError::conflict(
                        "Partner request has already been responded to",
                    ));
                }
                tx.get_link(link.id)?
                    .ok_or_else(|| InneraError::not_found("No pending partner request found"))
            })
            .await?;

        tracing::debug!(link_id = %link.id, status = %link.status, "partner request answered");
        let notification = if accept {
            Notification::new(link.initiator_id, NotificationKind::PartnerAccepted, "Partner request accepted", now)
                .with_body("Your partner invite has been accepted!")
        } else {
            Notification::new(link.initiator_id, NotificationKind::PartnerDeclined, "Partner request declined", now)
                .with_body("Your partner invite was declined.")
        };
        dispatch(
            &self.notifier,
            notification.with_data(serde_json::json!({ "linkId": link.id }).to_string()),
        );
        Ok(link)
    }

    /// End the caller's ACTIVE link.
    pub async fn revoke(&self, user: UserId) -> Result<PartnerLink> {
        let now = Utc::now();
        let link = self
            .store
            .transaction(move |tx| -> Result<PartnerLink> {
                let link = tx
                    .open_link_for(user)?
                    .filter(|l| l.status == LinkStatus::Active)
                    .ok_or_else(|| InneraError::not_found("No active partner link found"))?;
                if tx.transition_link(link.id, LinkStatus::Active, LinkStatus::Revoked, user, now)? == 0 {
                    return Err(InneraError::conflict("Partner link has already been revoked"));
                }
                tx.get_link(link.id)?
                    .ok_or_else(|| InneraError::not_found("No active partner link found"))
            })
            .await?;

        tracing::info!(link_id = %link.id, revoked_by = %user, "partner link revoked");
        if let Some(other) = link.counterpart(user) {
            dispatch(
                &self.notifier,
                Notification::new(other, NotificationKind::PartnerRevoked, "Partner disconnected", now)
                    .with_body("Your partner has ended the connection."),
            );
        }
        Ok(link)
    }

    /// The caller's PENDING or ACTIVE link, if any.
    pub async fn current(&self, user: UserId) -> Result<Option<PartnerView>> {
        let link = self.store.open_link_for(user).await?;
        Ok(link.and_then(|l| {
            Some(PartnerView {
                role: l.role_of(user)?,
                partner_id: l.counterpart(user)?,
                id: l.id,
                status: l.status,
                initiated_at: l.initiated_at,
                responded_at: l.responded_at,
            })
        }))
    }
}

/// Lifetime for a code being put back: what it had left when it was read,
/// minus the time spent since. A code at or past zero stays gone. A backend
/// that reported no lifetime gets the full `fallback`.
fn restored_ttl(remaining: Option<Duration>, elapsed: Duration, fallback: Duration) -> Option<Duration> {
    match remaining {
        Some(left) => left.checked_sub(elapsed).filter(|d| !d.is_zero()),
        None => Some(fallback),
    }
}

fn parse_inviter(raw: &str) -> Result<UserId> {
    raw.parse()
        .map_err(|_| StoreError::InvalidData(format!("partner invite holds a malformed user id: {}", raw)).into())
}

/// Re-check both parties and insert the link, all under one transaction.
fn link_in_tx(
    tx: &mut dyn StoreTx,
    inviter: UserId,
    acceptor: UserId,
    now: DateTime<Utc>,
) -> Result<Acceptance> {
    if tx.open_link_for(acceptor)?.is_some() {
        return Ok(Acceptance::AcceptorLinked);
    }
    if tx.open_link_for(inviter)?.is_some() {
        return Ok(Acceptance::InviterLinked);
    }
    let link = PartnerLink::accepted(inviter, acceptor, now);
    tx.insert_link(&link)?;
    Ok(Acceptance::Linked(link))
}
