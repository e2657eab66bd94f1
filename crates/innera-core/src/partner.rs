//! Partner links.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{LinkId, UserId};

/// Lifecycle of a partner link.
///
/// `Pending` and `Active` are "open": a user may be party to at most one open link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Pending,
    Active,
    Declined,
    Revoked,
}

impl LinkStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Pending => "PENDING",
            LinkStatus::Active => "ACTIVE",
            LinkStatus::Declined => "DECLINED",
            LinkStatus::Revoked => "REVOKED",
        }
    }

    pub const fn is_open(self) -> bool {
        matches!(self, LinkStatus::Pending | LinkStatus::Active)
    }
}

impl FromStr for LinkStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(LinkStatus::Pending),
            "ACTIVE" => Ok(LinkStatus::Active),
            "DECLINED" => Ok(LinkStatus::Declined),
            "REVOKED" => Ok(LinkStatus::Revoked),
            other => Err(CoreError::UnknownVariant {
                kind: "link status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a link a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkRole {
    Initiator,
    Partner,
}

/// A pairing between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerLink {
    pub id: LinkId,
    pub initiator_id: UserId,
    pub partner_id: UserId,
    pub status: LinkStatus,
    pub initiated_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<UserId>,
}

impl PartnerLink {
    /// A link formed by redeeming an invite code. Redemption implies consent,
    /// so the link starts `Active` with `responded_at` set.
    pub fn accepted(initiator_id: UserId, partner_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: LinkId::new(),
            initiator_id,
            partner_id,
            status: LinkStatus::Active,
            initiated_at: now,
            responded_at: Some(now),
            revoked_at: None,
            revoked_by: None,
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.initiator_id == user || self.partner_id == user
    }

    /// The other party, if `user` is on this link.
    pub fn counterpart(&self, user: UserId) -> Option<UserId> {
        if self.initiator_id == user {
            Some(self.partner_id)
        } else if self.partner_id == user {
            Some(self.initiator_id)
        } else {
            None
        }
    }

    pub fn role_of(&self, user: UserId) -> Option<LinkRole> {
        if self.initiator_id == user {
            Some(LinkRole::Initiator)
        } else if self.partner_id == user {
            Some(LinkRole::Partner)
        } else {
            None
        }
    }
}
