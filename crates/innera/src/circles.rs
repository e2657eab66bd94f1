//! Circles, memberships, and counted invite codes.
//!
//! Every operation is one relational transaction. Guarded writes report how
//! many rows they touched; zero means another request got there first and
//! the whole transaction is abandoned with `Conflict`.
//!
//! Redeeming an invite increments `used_count` last, after the membership is
//! in place, so an invite exhausted by a concurrent joiner rolls back the
//! membership change with it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use innera_core::{
    Circle, CircleId, CircleInvite, CircleRole, CircleStatus, HistoryPolicy, InviteId, Membership,
    MembershipStatus, Notification, NotificationKind, UserId,
};
use innera_perms::{can_kick_member, can_manage_circle, require, MembershipContext, Viewer};
use innera_store::{Store, StoreTx};
use serde::{Deserialize, Serialize};

use crate::config::InvitePolicy;
use crate::error::{InneraError, Result};
use crate::notify::{dispatch, Notifier};

/// A new circle together with its owner membership and founding invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCircle {
    pub circle: Circle,
    pub membership: Membership,
    pub invite: CircleInvite,
}

/// The result of redeeming an invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedCircle {
    pub circle: Circle,
    pub membership: Membership,
}

/// Circle capacity and invite defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CirclePolicy {
    pub max_members: u32,
    pub founding_invite: InvitePolicy,
    pub ad_hoc_invite: InvitePolicy,
}

/// Drives circle membership and invites.
pub struct CircleInviteCoordinator<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
    policy: CirclePolicy,
}

impl<S: Store> CircleInviteCoordinator<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>, policy: CirclePolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    /// Create a circle owned by `user`, with a founding invite.
    pub async fn create_circle(
        &self,
        user: UserId,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<CreatedCircle> {
        let name = name.into();
        let policy = self.policy;
        let now = Utc::now();

        let created = self
            .store
            .transaction(move |tx| -> Result<CreatedCircle> {
                let circle = Circle {
                    id: CircleId::new(),
                    name,
                    description,
                    created_by: user,
                    status: CircleStatus::Active,
                    max_members: policy.max_members,
                    created_at: now,
                };
                tx.insert_circle(&circle)?;

                let membership =
                    Membership::active(circle.id, user, CircleRole::Owner, HistoryPolicy::All, now);
                tx.insert_membership(&membership)?;

                let invite = new_invite(circle.id, Some(user), policy.founding_invite, now)?;
                tx.insert_invite(&invite)?;

                Ok(CreatedCircle {
                    circle,
                    membership,
                    invite,
                })
            })
            .await?;

        tracing::info!(circle_id = %created.circle.id, owner_id = %user, "circle created");
        Ok(created)
    }

    /// Redeem an invite code.
    ///
    /// A LEFT or REMOVED membership is reactivated in place as a MEMBER with
    /// the new history policy and a fresh join date.
    pub async fn join_by_code(
        &self,
        user: UserId,
        code: &str,
        history_policy: HistoryPolicy,
    ) -> Result<JoinedCircle> {
        let code = code.to_string();
        let now = Utc::now();

        let joined = self
            .store
            .transaction(move |tx| join_in_tx(tx, user, &code, history_policy, now))
            .await?;

        tracing::info!(
            circle_id = %joined.circle.id,
            user_id = %user,
            history_policy = %history_policy,
            "joined circle"
        );
        if joined.circle.created_by != user {
            dispatch(
                &self.notifier,
                Notification::new(
                    joined.circle.created_by,
                    NotificationKind::CircleMemberJoined,
                    "New circle member",
                    now,
                )
                .with_body(format!("Someone joined {}", joined.circle.name))
                .with_data(
                    serde_json::json!({ "circleId": joined.circle.id, "userId": user }).to_string(),
                ),
            );
        }
        Ok(joined)
    }

    /// Owner-only: issue another invite with the ad-hoc defaults.
    pub async fn generate_invite(&self, owner: UserId, circle_id: CircleId) -> Result<CircleInvite> {
        let policy = self.policy.ad_hoc_invite;
        let now = Utc::now();

        let invite = self
            .store
            .transaction(move |tx| -> Result<CircleInvite> {
                let circle = load_circle(tx, circle_id)?;
                let viewer = member_viewer(tx, circle_id, owner)?;
                require(can_manage_circle(&viewer, circle_id), "create circle invites")?;
                if !circle.is_active() {
                    return Err(InneraError::bad_request("This circle is archived"));
                }
                let invite = new_invite(circle_id, Some(owner), policy, now)?;
                tx.insert_invite(&invite)?;
                Ok(invite)
            })
            .await?;

        tracing::debug!(circle_id = %circle_id, invite_id = %invite.id, "circle invite generated");
        Ok(invite)
    }

    /// Remove `target` from the circle. OWNER removes anyone but an OWNER;
    /// ADMIN removes MEMBERs.
    pub async fn remove_member(&self, actor: UserId, circle_id: CircleId, target: UserId) -> Result<()> {
        if actor == target {
            return Err(InneraError::bad_request("Use leave to exit a circle"));
        }
        let now = Utc::now();

        let circle = self
            .store
            .transaction(move |tx| -> Result<Circle> {
                let circle = load_circle(tx, circle_id)?;
                let viewer = member_viewer(tx, circle_id, actor)?;
                let member = tx
                    .get_membership(circle_id, target)?
                    .filter(Membership::is_active)
                    .ok_or_else(|| InneraError::not_found("Member not found"))?;
                require(can_kick_member(&viewer, circle_id, member.role), "remove this member")?;

                if tx.end_membership(circle_id, target, MembershipStatus::Removed, now)? == 0 {
                    return Err(InneraError::conflict(
                        "Member has already left or been removed; refresh and retry",
                    ));
                }
                Ok(circle)
            })
            .await?;

        tracing::info!(circle_id = %circle_id, user_id = %target, removed_by = %actor, "member removed");
        dispatch(
            &self.notifier,
            Notification::new(target, NotificationKind::CircleMemberRemoved, "Removed from circle", now)
                .with_body(format!("You were removed from {}", circle.name))
                .with_data(serde_json::json!({ "circleId": circle_id }).to_string()),
        );
        Ok(())
    }

    /// Leave a circle. The OWNER must transfer ownership first.
    pub async fn leave(&self, user: UserId, circle_id: CircleId) -> Result<()> {
        let now = Utc::now();
        self.store
            .transaction(move |tx| -> Result<()> {
                let membership = tx
                    .get_membership(circle_id, user)?
                    .filter(Membership::is_active)
                    .ok_or_else(|| InneraError::not_found("You are not a member of this circle"))?;
                if membership.role == CircleRole::Owner {
                    return Err(InneraError::bad_request(
                        "Transfer ownership before leaving the circle",
                    ));
                }
                if tx.end_membership(circle_id, user, MembershipStatus::Left, now)? == 0 {
                    return Err(InneraError::conflict("You have already left this circle"));
                }
                Ok(())
            })
            .await?;

        tracing::debug!(circle_id = %circle_id, user_id = %user, "left circle");
        Ok(())
    }

    /// Promote `target` to OWNER and demote the current owner to ADMIN.
    pub async fn transfer_ownership(&self, owner: UserId, circle_id: CircleId, target: UserId) -> Result<()> {
        if owner == target {
            return Err(InneraError::bad_request("You already own this circle"));
        }

        self.store
            .transaction(move |tx| -> Result<()> {
                load_circle(tx, circle_id)?;
                let viewer = member_viewer(tx, circle_id, owner)?;
                require(can_manage_circle(&viewer, circle_id), "transfer ownership")?;

                let member = tx
                    .get_membership(circle_id, target)?
                    .filter(Membership::is_active)
                    .ok_or_else(|| InneraError::not_found("Member not found"))?;

                if tx.set_member_role(circle_id, target, member.role, CircleRole::Owner)? == 0 {
                    return Err(InneraError::conflict("Member changed; refresh and retry"));
                }
                if tx.set_member_role(circle_id, owner, CircleRole::Owner, CircleRole::Admin)? == 0 {
                    return Err(InneraError::conflict("Ownership already changed; refresh and retry"));
                }
                Ok(())
            })
            .await?;

        tracing::info!(circle_id = %circle_id, from = %owner, to = %target, "circle ownership transferred");
        Ok(())
    }

    /// Owner-only: archive the circle. Archived circles reject joins.
    pub async fn archive(&self, owner: UserId, circle_id: CircleId) -> Result<Circle> {
        let circle = self
            .store
            .transaction(move |tx| -> Result<Circle> {
                load_circle(tx, circle_id)?;
                let viewer = member_viewer(tx, circle_id, owner)?;
                require(can_manage_circle(&viewer, circle_id), "archive circle")?;
                if tx.set_circle_status(circle_id, CircleStatus::Active, CircleStatus::Archived)? == 0 {
                    return Err(InneraError::conflict("Circle is already archived"));
                }
                load_circle(tx, circle_id)
            })
            .await?;

        tracing::info!(circle_id = %circle_id, "circle archived");
        Ok(circle)
    }
}

fn join_in_tx(
    tx: &mut dyn StoreTx,
    user: UserId,
    code: &str,
    history_policy: HistoryPolicy,
    now: DateTime<Utc>,
) -> Result<JoinedCircle> {
    let invite = tx
        .find_invite_by_code(code)?
        .filter(|i| !i.is_expired(now))
        .ok_or_else(|| InneraError::bad_request("Invalid or expired invite code"))?;
    if invite.is_exhausted() {
        return Err(InneraError::conflict(
            "This invite has reached its maximum uses; ask for a new one",
        ));
    }

    let circle = tx
        .get_circle(invite.circle_id)?
        .ok_or_else(|| InneraError::bad_request("Invalid or expired invite code"))?;
    if !circle.is_active() {
        return Err(InneraError::bad_request("This circle is archived"));
    }

    if tx.count_active_members(circle.id)? >= circle.max_members {
        return Err(InneraError::conflict("This circle is full"));
    }

    let membership = match tx.get_membership(circle.id, user)? {
        Some(existing) if existing.is_active() => {
            return Err(InneraError::conflict("You are already a member of this circle"));
        }
        Some(existing) => {
            if tx.reactivate_membership(existing.id, CircleRole::Member, history_policy, now)? == 0 {
                return Err(InneraError::conflict(
                    "Membership changed concurrently; refresh and retry",
                ));
            }
            tx.get_membership(circle.id, user)?
                .ok_or_else(|| InneraError::conflict("Membership changed concurrently; refresh and retry"))?
        }
        None => {
            let membership =
                Membership::active(circle.id, user, CircleRole::Member, history_policy, now);
            tx.insert_membership(&membership)?;
            membership
        }
    };

    if tx.increment_invite_use(invite.id)? == 0 {
        return Err(InneraError::conflict(
            "This invite was just used up by someone else; ask for a new one",
        ));
    }

    Ok(JoinedCircle { circle, membership })
}

fn load_circle(tx: &mut dyn StoreTx, circle_id: CircleId) -> Result<Circle> {
    tx.get_circle(circle_id)?
        .ok_or_else(|| InneraError::not_found("Circle not found"))
}

/// A viewer carrying only the user's membership in one circle.
fn member_viewer(tx: &mut dyn StoreTx, circle_id: CircleId, user: UserId) -> Result<Viewer> {
    let viewer = Viewer::new(user);
    Ok(match tx.get_membership(circle_id, user)? {
        Some(m) => viewer.with_membership(circle_id, MembershipContext::from(&m)),
        None => viewer,
    })
}

fn new_invite(
    circle_id: CircleId,
    invited_by: Option<UserId>,
    policy: InvitePolicy,
    now: DateTime<Utc>,
) -> Result<CircleInvite> {
    let ttl = chrono::Duration::from_std(policy.ttl)
        .map_err(|e| InneraError::bad_request(format!("invite lifetime out of range: {}", e)))?;
    Ok(CircleInvite {
        id: InviteId::new(),
        circle_id,
        invited_by,
        invite_code: crate::generate_code(),
        expires_at: now + ttl,
        max_uses: policy.max_uses,
        used_count: 0,
        created_at: now,
    })
}
