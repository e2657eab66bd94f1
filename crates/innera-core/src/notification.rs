//! In-app notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{NotificationId, UserId};

wire_enum!(
    /// What happened.
    NotificationKind, "notification kind" {
        PartnerAccepted => "PARTNER_ACCEPTED",
        PartnerDeclined => "PARTNER_DECLINED",
        PartnerRevoked => "PARTNER_REVOKED",
        CircleMemberJoined => "CIRCLE_MEMBER_JOINED",
        CircleMemberRemoved => "CIRCLE_MEMBER_REMOVED",
    }
);

/// A notification addressed to one user.
///
/// `data` is a small JSON document with the ids the client needs to deep-link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: Option<String>,
    pub data: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: UserId, kind: NotificationKind, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            kind,
            title: title.into(),
            body: None,
            data: None,
            read: false,
            created_at: now,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}
