//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use innera_core::{
    Circle, CircleId, CircleInvite, CircleRole, CircleStatus, Entry, EntryId, HistoryPolicy,
    InviteId, LinkId, LinkStatus, Membership, MembershipId, MembershipStatus, Notification,
    PartnerLink, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::traits::{Store, StoreTx, VersionedUpdate};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. A transaction works on a copy
/// of the tables under the write lock and swaps it in on success, so a failed
/// closure leaves no trace.
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[derive(Clone, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    links: HashMap<LinkId, PartnerLink>,
    circles: HashMap<CircleId, Circle>,
    memberships: HashMap<MembershipId, Membership>,
    invites: HashMap<InviteId, CircleInvite>,
    entries: HashMap<EntryId, Entry>,
    notifications: Vec<Notification>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let mut inner = self.inner.write().map_err(StoreError::poisoned)?;
        let mut working = inner.clone();
        let out = f(&mut working)?;
        *inner = working;
        Ok(out)
    }
}

impl StoreTx for Tables {
    fn insert_user(&mut self, user: &User) -> Result<()> {
        if self.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Constraint(format!("duplicate email: {}", user.email)));
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    fn get_user(&mut self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.get(&id).cloned())
    }

    fn insert_link(&mut self, link: &PartnerLink) -> Result<()> {
        self.links.insert(link.id, link.clone());
        Ok(())
    }

    fn get_link(&mut self, id: LinkId) -> Result<Option<PartnerLink>> {
        Ok(self.links.get(&id).cloned())
    }

    fn open_link_for(&mut self, user: UserId) -> Result<Option<PartnerLink>> {
        Ok(self
            .links
            .values()
            .find(|l| l.status.is_open() && l.involves(user))
            .cloned())
    }

    fn transition_link(
        &mut self,
        id: LinkId,
        from: LinkStatus,
        to: LinkStatus,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        match self.links.get_mut(&id) {
            Some(link) if link.status == from => {
                link.status = to;
                if from == LinkStatus::Pending {
                    link.responded_at = Some(at);
                }
                if to == LinkStatus::Revoked {
                    link.revoked_at = Some(at);
                    link.revoked_by = Some(actor);
                }
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn insert_circle(&mut self, circle: &Circle) -> Result<()> {
        self.circles.insert(circle.id, circle.clone());
        Ok(())
    }

    fn get_circle(&mut self, id: CircleId) -> Result<Option<Circle>> {
        Ok(self.circles.get(&id).cloned())
    }

    fn set_circle_status(&mut self, id: CircleId, from: CircleStatus, to: CircleStatus) -> Result<u64> {
        match self.circles.get_mut(&id) {
            Some(circle) if circle.status == from => {
                circle.status = to;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn count_active_members(&mut self, circle: CircleId) -> Result<u32> {
        Ok(self
            .memberships
            .values()
            .filter(|m| m.circle_id == circle && m.is_active())
            .count() as u32)
    }

    fn insert_membership(&mut self, membership: &Membership) -> Result<()> {
        let duplicate = self
            .memberships
            .values()
            .any(|m| m.circle_id == membership.circle_id && m.user_id == membership.user_id);
        if duplicate {
            return Err(StoreError::Constraint(format!(
                "membership exists for circle {} user {}",
                membership.circle_id, membership.user_id
            )));
        }
        self.memberships.insert(membership.id, membership.clone());
        Ok(())
    }

    fn get_membership(&mut self, circle: CircleId, user: UserId) -> Result<Option<Membership>> {
        Ok(self
            .memberships
            .values()
            .find(|m| m.circle_id == circle && m.user_id == user)
            .cloned())
    }

    fn memberships_for_user(&mut self, user: UserId) -> Result<Vec<Membership>> {
        let mut rows: Vec<Membership> = self
            .memberships
            .values()
            .filter(|m| m.user_id == user)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.joined_at);
        Ok(rows)
    }

    fn reactivate_membership(
        &mut self,
        id: MembershipId,
        role: CircleRole,
        history_policy: HistoryPolicy,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        match self.memberships.get_mut(&id) {
            Some(m) if !m.is_active() => {
                m.status = MembershipStatus::Active;
                m.role = role;
                m.history_policy = history_policy;
                m.joined_at = at;
                m.left_at = None;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn end_membership(
        &mut self,
        circle: CircleId,
        user: UserId,
        status: MembershipStatus,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let row = self
            .memberships
            .values_mut()
            .find(|m| m.circle_id == circle && m.user_id == user && m.is_active());
        match row {
            Some(m) => {
                m.status = status;
                m.left_at = Some(at);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn set_member_role(
        &mut self,
        circle: CircleId,
        user: UserId,
        from: CircleRole,
        to: CircleRole,
    ) -> Result<u64> {
        let row = self.memberships.values_mut().find(|m| {
            m.circle_id == circle && m.user_id == user && m.is_active() && m.role == from
        });
        match row {
            Some(m) => {
                m.role = to;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn insert_invite(&mut self, invite: &CircleInvite) -> Result<()> {
        if self.invites.values().any(|i| i.invite_code == invite.invite_code) {
            return Err(StoreError::Constraint("duplicate invite code".to_string()));
        }
        self.invites.insert(invite.id, invite.clone());
        Ok(())
    }

    fn get_invite(&mut self, id: InviteId) -> Result<Option<CircleInvite>> {
        Ok(self.invites.get(&id).cloned())
    }

    fn find_invite_by_code(&mut self, code: &str) -> Result<Option<CircleInvite>> {
        Ok(self.invites.values().find(|i| i.invite_code == code).cloned())
    }

    fn increment_invite_use(&mut self, id: InviteId) -> Result<u64> {
        match self.invites.get_mut(&id) {
            Some(invite) if invite.used_count < invite.max_uses => {
                invite.used_count += 1;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn insert_entry(&mut self, entry: &Entry) -> Result<()> {
        self.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    fn get_entry(&mut self, id: EntryId) -> Result<Option<Entry>> {
        Ok(self.entries.get(&id).cloned())
    }

    fn update_entry_versioned(&mut self, update: &VersionedUpdate) -> Result<u64> {
        match self.entries.get_mut(&update.id) {
            Some(e)
                if e.author_id == update.author_id
                    && e.version == update.expected_version
                    && e.deleted_at.is_none() =>
            {
                if let Some(content) = &update.content_encrypted {
                    e.content_encrypted = content.clone();
                }
                e.visibility = update.visibility.clone();
                e.circle_id = update.circle_id;
                e.version += 1;
                e.updated_at = update.updated_at;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn set_entry_deleted(&mut self, id: EntryId, deleted_at: Option<DateTime<Utc>>) -> Result<u64> {
        match self.entries.get_mut(&id) {
            Some(e) if e.deleted_at.is_some() != deleted_at.is_some() => {
                e.deleted_at = deleted_at;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn insert_notification(&mut self, notification: &Notification) -> Result<()> {
        self.notifications.push(notification.clone());
        Ok(())
    }

    fn notifications_for(&mut self, user: UserId) -> Result<Vec<Notification>> {
        Ok(self
            .notifications
            .iter()
            .filter(|n| n.user_id == user)
            .cloned()
            .collect())
    }
}
