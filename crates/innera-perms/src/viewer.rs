//! The viewer context an access decision is made against.
//!
//! Callers load the viewer's partner link and memberships before asking any
//! question; nothing in this crate performs I/O.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use innera_core::{
    CircleId, CircleRole, HistoryPolicy, LinkStatus, Membership, MembershipStatus, PartnerLink,
    UserId,
};
use serde::{Deserialize, Serialize};

/// The viewer's side of a partner link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerContext {
    pub partner_id: UserId,
    pub status: LinkStatus,
}

/// The viewer's membership in one circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipContext {
    pub role: CircleRole,
    pub status: MembershipStatus,
    pub history_policy: HistoryPolicy,
    pub joined_at: DateTime<Utc>,
}

impl MembershipContext {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

impl From<&Membership> for MembershipContext {
    fn from(m: &Membership) -> Self {
        Self {
            role: m.role,
            status: m.status,
            history_policy: m.history_policy,
            joined_at: m.joined_at,
        }
    }
}

/// Everything the evaluator knows about the requesting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user_id: UserId,
    pub partner: Option<PartnerContext>,
    pub memberships: HashMap<CircleId, MembershipContext>,
}

impl Viewer {
    /// A viewer with no partner and no memberships.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            partner: None,
            memberships: HashMap::new(),
        }
    }

    /// Assemble a viewer from stored rows.
    ///
    /// `link` is ignored unless it involves `user_id`; memberships belonging to
    /// other users are skipped.
    pub fn from_rows(user_id: UserId, link: Option<&PartnerLink>, memberships: &[Membership]) -> Self {
        let partner = link.and_then(|l| {
            l.counterpart(user_id).map(|partner_id| PartnerContext {
                partner_id,
                status: l.status,
            })
        });
        let memberships = memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| (m.circle_id, MembershipContext::from(m)))
            .collect();
        Self {
            user_id,
            partner,
            memberships,
        }
    }

    pub fn with_partner(mut self, partner_id: UserId, status: LinkStatus) -> Self {
        self.partner = Some(PartnerContext { partner_id, status });
        self
    }

    pub fn with_membership(mut self, circle_id: CircleId, membership: MembershipContext) -> Self {
        self.memberships.insert(circle_id, membership);
        self
    }

    /// The viewer's ACTIVE membership in `circle_id`, if any.
    pub fn active_membership(&self, circle_id: CircleId) -> Option<&MembershipContext> {
        self.memberships.get(&circle_id).filter(|m| m.is_active())
    }

    /// Whether the viewer's link with `user` is ACTIVE.
    pub fn is_active_partner_of(&self, user: UserId) -> bool {
        self.partner
            .is_some_and(|p| p.partner_id == user && p.status == LinkStatus::Active)
    }
}
