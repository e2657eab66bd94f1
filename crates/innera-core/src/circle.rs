//! Circles, memberships, and circle invites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CircleId, InviteId, MembershipId, UserId};

wire_enum!(
    /// Whether a circle accepts activity.
    CircleStatus, "circle status" {
        Active => "ACTIVE",
        Archived => "ARCHIVED",
    }
);

wire_enum!(
    /// Role of a member within a circle.
    CircleRole, "circle role" {
        Owner => "OWNER",
        Admin => "ADMIN",
        Member => "MEMBER",
    }
);

wire_enum!(
    /// Membership lifecycle. Rows are reactivated in place on re-join.
    MembershipStatus, "membership status" {
        Active => "ACTIVE",
        Left => "LEFT",
        Removed => "REMOVED",
    }
);

wire_enum!(
    /// Whether a member sees entries created before they joined.
    HistoryPolicy, "history policy" {
        All => "ALL",
        FutureOnly => "FUTURE_ONLY",
    }
);

impl CircleRole {
    /// Whether a member with this role may remove a member holding `target`.
    ///
    /// Owners may remove anyone except another owner; admins may remove plain
    /// members; members may remove nobody.
    pub const fn can_remove(self, target: CircleRole) -> bool {
        match (self, target) {
            (CircleRole::Owner, CircleRole::Owner) => false,
            (CircleRole::Owner, _) => true,
            (CircleRole::Admin, CircleRole::Member) => true,
            _ => false,
        }
    }

    /// Owners and admins moderate circle content.
    pub const fn is_moderator(self) -> bool {
        matches!(self, CircleRole::Owner | CircleRole::Admin)
    }
}

/// A group of users sharing circle-scoped entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circle {
    pub id: CircleId,
    pub name: String,
    pub description: Option<String>,
    pub created_by: UserId,
    pub status: CircleStatus,
    pub max_members: u32,
    pub created_at: DateTime<Utc>,
}

impl Circle {
    pub fn is_active(&self) -> bool {
        self.status == CircleStatus::Active
    }
}

/// A user's membership in a circle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: MembershipId,
    pub circle_id: CircleId,
    pub user_id: UserId,
    pub role: CircleRole,
    pub status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub history_policy: HistoryPolicy,
}

impl Membership {
    /// A fresh active membership.
    pub fn active(
        circle_id: CircleId,
        user_id: UserId,
        role: CircleRole,
        history_policy: HistoryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MembershipId::new(),
            circle_id,
            user_id,
            role,
            status: MembershipStatus::Active,
            joined_at: now,
            left_at: None,
            history_policy,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

/// A multi-use, counted invite code for a circle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleInvite {
    pub id: InviteId,
    pub circle_id: CircleId,
    pub invited_by: Option<UserId>,
    pub invite_code: String,
    pub expires_at: DateTime<Utc>,
    pub max_uses: u32,
    pub used_count: u32,
    pub created_at: DateTime<Utc>,
}

impl CircleInvite {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_exhausted(&self) -> bool {
        self.used_count >= self.max_uses
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.used_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_wire_names() {
        assert_eq!(CircleRole::Owner.as_str(), "OWNER");
        assert_eq!("FUTURE_ONLY".parse::<HistoryPolicy>().unwrap(), HistoryPolicy::FutureOnly);
        assert_eq!(
            serde_json::to_string(&MembershipStatus::Removed).unwrap(),
            "\"REMOVED\""
        );
        assert!("SUPERUSER".parse::<CircleRole>().is_err());
    }

    #[test]
    fn test_remove_rules() {
        use CircleRole::*;
        assert!(Owner.can_remove(Admin));
        assert!(Owner.can_remove(Member));
        assert!(!Owner.can_remove(Owner));
        assert!(Admin.can_remove(Member));
        assert!(!Admin.can_remove(Admin));
        assert!(!Admin.can_remove(Owner));
        assert!(!Member.can_remove(Member));
    }

    #[test]
    fn test_invite_exhaustion_and_expiry() {
        let now = Utc::now();
        let mut invite = CircleInvite {
            id: InviteId::new(),
            circle_id: CircleId::new(),
            invited_by: None,
            invite_code: "abc".to_string(),
            expires_at: now + Duration::days(1),
            max_uses: 2,
            used_count: 1,
            created_at: now,
        };
        assert!(!invite.is_exhausted());
        assert_eq!(invite.remaining_uses(), 1);
        invite.used_count = 2;
        assert!(invite.is_exhausted());
        assert!(!invite.is_expired(now));
        assert!(invite.is_expired(now + Duration::days(2)));
    }
}
