//! Store traits: the abstract interfaces for relational and key-value persistence.
//!
//! The coordinators are storage-agnostic. Implementations include SQLite
//! (primary) and in-memory (for tests).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use innera_core::{
    Circle, CircleId, CircleInvite, CircleRole, CircleStatus, Entry, EntryId, HistoryPolicy,
    InviteId, LinkId, LinkStatus, Membership, MembershipId, MembershipStatus, Notification,
    PartnerLink, User, UserId, Visibility,
};

use crate::error::{Result, StoreError};

/// One page of a key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Keys in ascending order.
    pub keys: Vec<String>,
    /// Cursor for the next page, `None` when the scan is complete.
    pub next: Option<String>,
}

/// A TTL key-value store.
///
/// Every key carries its own expiry. Expired keys are invisible to every
/// operation, and writing one key never changes the expiry of another.
///
/// The single-key operations below are each atomic: two callers racing on
/// `get_del` or `del` for the same key can never both observe the value.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any existing one and resetting its TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Write a value only if no live value exists. Returns whether it was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Remaining lifetime of a live key.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Read and remove a value in one step.
    async fn get_del(&self, key: &str) -> Result<Option<String>>;

    /// Remove a key, reporting whether a live value existed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Remove several keys, returning how many live values were removed.
    async fn del_many(&self, keys: &[String]) -> Result<u64>;

    /// Enumerate live keys starting with `prefix`, strictly after `after`,
    /// returning at most `count` keys per page.
    async fn scan(&self, prefix: &str, after: Option<&str>, count: usize) -> Result<ScanPage>;
}

/// Row-level operations available inside a relational transaction.
///
/// All methods are synchronous; the surrounding [`Store::transaction`] call
/// is the suspension point. Guarded writes return the number of rows they
/// changed so callers can turn a lost race into `Conflict` or `NotFound`.
pub trait StoreTx {
    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_user(&mut self, user: &User) -> Result<()>;

    fn get_user(&mut self, id: UserId) -> Result<Option<User>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Partner Links
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_link(&mut self, link: &PartnerLink) -> Result<()>;

    fn get_link(&mut self, id: LinkId) -> Result<Option<PartnerLink>>;

    /// The PENDING or ACTIVE link involving `user`, if any.
    fn open_link_for(&mut self, user: UserId) -> Result<Option<PartnerLink>>;

    /// Move a link out of `from` into `to`, only if it is still in `from`.
    ///
    /// `responded_at` is set when moving out of PENDING. Moving to REVOKED
    /// records `revoked_at` and `revoked_by`.
    fn transition_link(
        &mut self,
        id: LinkId,
        from: LinkStatus,
        to: LinkStatus,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Circles
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_circle(&mut self, circle: &Circle) -> Result<()>;

    fn get_circle(&mut self, id: CircleId) -> Result<Option<Circle>>;

    /// Guarded status change. Returns 0 if the circle is not in `from`.
    fn set_circle_status(&mut self, id: CircleId, from: CircleStatus, to: CircleStatus) -> Result<u64>;

    fn count_active_members(&mut self, circle: CircleId) -> Result<u32>;

    // ─────────────────────────────────────────────────────────────────────────
    // Memberships
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_membership(&mut self, membership: &Membership) -> Result<()>;

    /// The membership row for (circle, user) in any status.
    fn get_membership(&mut self, circle: CircleId, user: UserId) -> Result<Option<Membership>>;

    /// Every membership row of `user`, any status.
    fn memberships_for_user(&mut self, user: UserId) -> Result<Vec<Membership>>;

    /// Reactivate a LEFT/REMOVED row in place. Returns 0 if the row is ACTIVE.
    ///
    /// Besides status, role, history policy and `left_at`, this also moves
    /// `joined_at` to `at`, so FUTURE_ONLY history starts from the rejoin.
    fn reactivate_membership(
        &mut self,
        id: MembershipId,
        role: CircleRole,
        history_policy: HistoryPolicy,
        at: DateTime<Utc>,
    ) -> Result<u64>;

    /// End an ACTIVE membership. Returns 0 if it was not ACTIVE.
    fn end_membership(
        &mut self,
        circle: CircleId,
        user: UserId,
        status: MembershipStatus,
        at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Change the role of an ACTIVE membership currently holding `from`.
    fn set_member_role(
        &mut self,
        circle: CircleId,
        user: UserId,
        from: CircleRole,
        to: CircleRole,
    ) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Circle Invites
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_invite(&mut self, invite: &CircleInvite) -> Result<()>;

    fn get_invite(&mut self, id: InviteId) -> Result<Option<CircleInvite>>;

    fn find_invite_by_code(&mut self, code: &str) -> Result<Option<CircleInvite>>;

    /// `used_count = used_count + 1` guarded by `used_count < max_uses`.
    fn increment_invite_use(&mut self, id: InviteId) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Entries
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_entry(&mut self, entry: &Entry) -> Result<()>;

    /// Fetch an entry, including soft-deleted ones.
    fn get_entry(&mut self, id: EntryId) -> Result<Option<Entry>>;

    /// Versioned write: applies only when id, author and version match and the
    /// entry is not deleted, setting `version = version + 1`.
    fn update_entry_versioned(&mut self, update: &VersionedUpdate) -> Result<u64>;

    /// Set or clear `deleted_at`. Deleting is guarded by "not deleted",
    /// restoring by "deleted". The version stamp is untouched.
    fn set_entry_deleted(&mut self, id: EntryId, deleted_at: Option<DateTime<Utc>>) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_notification(&mut self, notification: &Notification) -> Result<()>;

    fn notifications_for(&mut self, user: UserId) -> Result<Vec<Notification>>;
}

/// The fields of a version-checked entry write.
#[derive(Debug, Clone)]
pub struct VersionedUpdate {
    pub id: EntryId,
    pub author_id: UserId,
    pub expected_version: i64,
    pub content_encrypted: Option<bytes::Bytes>,
    pub visibility: Visibility,
    pub circle_id: Option<CircleId>,
    pub updated_at: DateTime<Utc>,
}

/// The relational store.
///
/// All access goes through [`Store::transaction`]: the closure's writes
/// commit together if it returns `Ok` and are discarded if it returns `Err`.
/// Transactions are serializable with respect to each other.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static;
}

/// Single-statement reads over [`Store`].
pub trait StoreExt: Store {
    fn get_user(&self, id: UserId) -> impl std::future::Future<Output = Result<Option<User>>> + Send;

    fn get_entry(&self, id: EntryId) -> impl std::future::Future<Output = Result<Option<Entry>>> + Send;

    fn get_circle(&self, id: CircleId) -> impl std::future::Future<Output = Result<Option<Circle>>> + Send;

    fn get_invite(&self, id: InviteId) -> impl std::future::Future<Output = Result<Option<CircleInvite>>> + Send;

    fn open_link_for(&self, user: UserId) -> impl std::future::Future<Output = Result<Option<PartnerLink>>> + Send;

    fn memberships_for_user(&self, user: UserId) -> impl std::future::Future<Output = Result<Vec<Membership>>> + Send;

    fn notifications_for(&self, user: UserId) -> impl std::future::Future<Output = Result<Vec<Notification>>> + Send;

    fn insert_user(&self, user: User) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<S: Store> StoreExt for S {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.transaction(move |tx| tx.get_user(id)).await
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>> {
        self.transaction(move |tx| tx.get_entry(id)).await
    }

    async fn get_circle(&self, id: CircleId) -> Result<Option<Circle>> {
        self.transaction(move |tx| tx.get_circle(id)).await
    }

    async fn get_invite(&self, id: InviteId) -> Result<Option<CircleInvite>> {
        self.transaction(move |tx| tx.get_invite(id)).await
    }

    async fn open_link_for(&self, user: UserId) -> Result<Option<PartnerLink>> {
        self.transaction(move |tx| tx.open_link_for(user)).await
    }

    async fn memberships_for_user(&self, user: UserId) -> Result<Vec<Membership>> {
        self.transaction(move |tx| tx.memberships_for_user(user)).await
    }

    async fn notifications_for(&self, user: UserId) -> Result<Vec<Notification>> {
        self.transaction(move |tx| tx.notifications_for(user)).await
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        self.transaction(move |tx| tx.insert_user(&user)).await
    }
}
