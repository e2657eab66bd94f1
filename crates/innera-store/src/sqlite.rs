//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use innera_core::{
    Circle, CircleId, CircleInvite, CircleRole, CircleStatus, Entry, EntryId, HistoryPolicy,
    InviteId, LinkId, LinkStatus, Membership, MembershipId, MembershipStatus, Notification,
    PartnerLink, User, UserId, Visibility,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::sqlite_kv::SqliteKv;
use crate::traits::{Store, StoreTx, VersionedUpdate};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. Holding the mutex for the whole
/// transaction serializes transactions within the process; `BEGIN IMMEDIATE`
/// serializes writers across processes sharing the file.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist. Foreign keys
    /// are enforced on every connection.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A key-value handle sharing this store's connection.
    pub fn kv(&self) -> SqliteKv {
        SqliteKv::from_shared(self.conn.clone())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(StoreError::poisoned)?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::from)?;

            let out = f(&mut SqliteTx { tx: &tx })?;
            tx.commit().map_err(StoreError::from)?;
            Ok(out)
        })
        .await
        .map_err(StoreError::join)?
    }
}

/// [`StoreTx`] over an open rusqlite transaction. Dropping the transaction
/// without committing rolls it back.
struct SqliteTx<'a> {
    tx: &'a Transaction<'a>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Column helpers
// ─────────────────────────────────────────────────────────────────────────────

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn conversion_error(idx: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(StoreError::InvalidData(msg)))
}

/// Parse a TEXT column into anything with a `FromStr` impl (ids, status enums).
fn parsed<T>(row: &Row<'_>, name: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let idx = row.as_ref().column_index(name)?;
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: T::Err| conversion_error(idx, Type::Text, format!("{}: {}", name, e)))
}

fn parsed_opt<T>(row: &Row<'_>, name: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let idx = row.as_ref().column_index(name)?;
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse()
            .map_err(|e: T::Err| conversion_error(idx, Type::Text, format!("{}: {}", name, e)))
    })
    .transpose()
}

fn timestamp(row: &Row<'_>, name: &str) -> rusqlite::Result<DateTime<Utc>> {
    let idx = row.as_ref().column_index(name)?;
    let ms: i64 = row.get(idx)?;
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| conversion_error(idx, Type::Integer, format!("{}: out of range", name)))
}

fn timestamp_opt(row: &Row<'_>, name: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let idx = row.as_ref().column_index(name)?;
    let ms: Option<i64> = row.get(idx)?;
    ms.map(|ms| {
        Utc.timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| conversion_error(idx, Type::Integer, format!("{}: out of range", name)))
    })
    .transpose()
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mappers
// ─────────────────────────────────────────────────────────────────────────────

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parsed(row, "id")?,
        email: row.get("email")?,
        display_name: row.get("display_name")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<PartnerLink> {
    Ok(PartnerLink {
        id: parsed(row, "id")?,
        initiator_id: parsed(row, "initiator_id")?,
        partner_id: parsed(row, "partner_id")?,
        status: parsed(row, "status")?,
        initiated_at: timestamp(row, "initiated_at")?,
        responded_at: timestamp_opt(row, "responded_at")?,
        revoked_at: timestamp_opt(row, "revoked_at")?,
        revoked_by: parsed_opt(row, "revoked_by")?,
    })
}

fn row_to_circle(row: &Row<'_>) -> rusqlite::Result<Circle> {
    Ok(Circle {
        id: parsed(row, "id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_by: parsed(row, "created_by")?,
        status: parsed(row, "status")?,
        max_members: row.get("max_members")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn row_to_membership(row: &Row<'_>) -> rusqlite::Result<Membership> {
    Ok(Membership {
        id: parsed(row, "id")?,
        circle_id: parsed(row, "circle_id")?,
        user_id: parsed(row, "user_id")?,
        role: parsed(row, "role")?,
        status: parsed(row, "status")?,
        joined_at: timestamp(row, "joined_at")?,
        left_at: timestamp_opt(row, "left_at")?,
        history_policy: parsed(row, "history_policy")?,
    })
}

fn row_to_invite(row: &Row<'_>) -> rusqlite::Result<CircleInvite> {
    Ok(CircleInvite {
        id: parsed(row, "id")?,
        circle_id: parsed(row, "circle_id")?,
        invited_by: parsed_opt(row, "invited_by")?,
        invite_code: row.get("invite_code")?,
        expires_at: timestamp(row, "expires_at")?,
        max_uses: row.get("max_uses")?,
        used_count: row.get("used_count")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let content: Vec<u8> = row.get("content_encrypted")?;
    let visibility: String = row.get("visibility")?;
    Ok(Entry {
        id: parsed(row, "id")?,
        author_id: parsed(row, "author_id")?,
        content_encrypted: Bytes::from(content),
        // Unknown values survive the read so the evaluator can deny them.
        visibility: Visibility::from_stored(&visibility),
        circle_id: parsed_opt(row, "circle_id")?,
        version: row.get("version")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        deleted_at: timestamp_opt(row, "deleted_at")?,
    })
}

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: parsed(row, "id")?,
        user_id: parsed(row, "user_id")?,
        kind: parsed(row, "kind")?,
        title: row.get("title")?,
        body: row.get("body")?,
        data: row.get("data")?,
        read: row.get("read")?,
        created_at: timestamp(row, "created_at")?,
    })
}

impl StoreTx for SqliteTx<'_> {
    fn insert_user(&mut self, user: &User) -> Result<()> {
        self.tx.execute(
            "INSERT INTO users (id, email, display_name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id.to_string(),
                user.email,
                user.display_name,
                millis(user.created_at)
            ],
        )?;
        Ok(())
    }

    fn get_user(&mut self, id: UserId) -> Result<Option<User>> {
        Ok(self
            .tx
            .query_row(
                "SELECT * FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .optional()?)
    }

    fn insert_link(&mut self, link: &PartnerLink) -> Result<()> {
        self.tx.execute(
            "INSERT INTO partner_links (
                id, initiator_id, partner_id, status, initiated_at,
                responded_at, revoked_at, revoked_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                link.id.to_string(),
                link.initiator_id.to_string(),
                link.partner_id.to_string(),
                link.status.as_str(),
                millis(link.initiated_at),
                link.responded_at.map(millis),
                link.revoked_at.map(millis),
                link.revoked_by.map(|u| u.to_string()),
            ],
        )?;
        Ok(())
    }

    fn get_link(&mut self, id: LinkId) -> Result<Option<PartnerLink>> {
        Ok(self
            .tx
            .query_row(
                "SELECT * FROM partner_links WHERE id = ?1",
                params![id.to_string()],
                row_to_link,
            )
            .optional()?)
    }

    fn open_link_for(&mut self, user: UserId) -> Result<Option<PartnerLink>> {
        Ok(self
            .tx
            .query_row(
                "SELECT * FROM partner_links
                 WHERE (initiator_id = ?1 OR partner_id = ?1)
                   AND status IN ('PENDING', 'ACTIVE')
                 ORDER BY initiated_at DESC
                 LIMIT 1",
                params![user.to_string()],
                row_to_link,
            )
            .optional()?)
    }

    fn transition_link(
        &mut self,
        id: LinkId,
        from: LinkStatus,
        to: LinkStatus,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let responded_at = (from == LinkStatus::Pending).then_some(millis(at));
        let (revoked_at, revoked_by) = if to == LinkStatus::Revoked {
            (Some(millis(at)), Some(actor.to_string()))
        } else {
            (None, None)
        };
        let changed = self.tx.execute(
            "UPDATE partner_links
             SET status = ?3,
                 responded_at = COALESCE(?4, responded_at),
                 revoked_at = COALESCE(?5, revoked_at),
                 revoked_by = COALESCE(?6, revoked_by)
             WHERE id = ?1 AND status = ?2",
            params![
                id.to_string(),
                from.as_str(),
                to.as_str(),
                responded_at,
                revoked_at,
                revoked_by
            ],
        )?;
        Ok(changed as u64)
    }

    fn insert_circle(&mut self, circle: &Circle) -> Result<()> {
        self.tx.execute(
            "INSERT INTO circles (id, name, description, created_by, status, max_members, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                circle.id.to_string(),
                circle.name,
                circle.description,
                circle.created_by.to_string(),
                circle.status.as_str(),
                circle.max_members,
                millis(circle.created_at)
            ],
        )?;
        Ok(())
    }

    fn get_circle(&mut self, id: CircleId) -> Result<Option<Circle>> {
        Ok(self
            .tx
            .query_row(
                "SELECT * FROM circles WHERE id = ?1",
                params![id.to_string()],
                row_to_circle,
            )
            .optional()?)
    }

    fn set_circle_status(&mut self, id: CircleId, from: CircleStatus, to: CircleStatus) -> Result<u64> {
        let changed = self.tx.execute(
            "UPDATE circles SET status = ?3 WHERE id = ?1 AND status = ?2",
            params![id.to_string(), from.as_str(), to.as_str()],
        )?;
        Ok(changed as u64)
    }

    fn count_active_members(&mut self, circle: CircleId) -> Result<u32> {
        Ok(self.tx.query_row(
            "SELECT COUNT(*) FROM circle_memberships WHERE circle_id = ?1 AND status = 'ACTIVE'",
            params![circle.to_string()],
            |row| row.get(0),
        )?)
    }

    fn insert_membership(&mut self, membership: &Membership) -> Result<()> {
        self.tx.execute(
            "INSERT INTO circle_memberships (
                id, circle_id, user_id, role, status, joined_at, left_at, history_policy
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                membership.id.to_string(),
                membership.circle_id.to_string(),
                membership.user_id.to_string(),
                membership.role.as_str(),
                membership.status.as_str(),
                millis(membership.joined_at),
                membership.left_at.map(millis),
                membership.history_policy.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_membership(&mut self, circle: CircleId, user: UserId) -> Result<Option<Membership>> {
        Ok(self
            .tx
            .query_row(
                "SELECT * FROM circle_memberships WHERE circle_id = ?1 AND user_id = ?2",
                params![circle.to_string(), user.to_string()],
                row_to_membership,
            )
            .optional()?)
    }

    fn memberships_for_user(&mut self, user: UserId) -> Result<Vec<Membership>> {
        let mut stmt = self
            .tx
            .prepare("SELECT * FROM circle_memberships WHERE user_id = ?1 ORDER BY joined_at")?;
        let rows = stmt
            .query_map(params![user.to_string()], row_to_membership)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn reactivate_membership(
        &mut self,
        id: MembershipId,
        role: CircleRole,
        history_policy: HistoryPolicy,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let changed = self.tx.execute(
            "UPDATE circle_memberships
             SET status = 'ACTIVE', role = ?2, history_policy = ?3, joined_at = ?4, left_at = NULL
             WHERE id = ?1 AND status != 'ACTIVE'",
            params![id.to_string(), role.as_str(), history_policy.as_str(), millis(at)],
        )?;
        Ok(changed as u64)
    }

    fn end_membership(
        &mut self,
        circle: CircleId,
        user: UserId,
        status: MembershipStatus,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let changed = self.tx.execute(
            "UPDATE circle_memberships SET status = ?3, left_at = ?4
             WHERE circle_id = ?1 AND user_id = ?2 AND status = 'ACTIVE'",
            params![circle.to_string(), user.to_string(), status.as_str(), millis(at)],
        )?;
        Ok(changed as u64)
    }

    fn set_member_role(
        &mut self,
        circle: CircleId,
        user: UserId,
        from: CircleRole,
        to: CircleRole,
    ) -> Result<u64> {
        let changed = self.tx.execute(
            "UPDATE circle_memberships SET role = ?4
             WHERE circle_id = ?1 AND user_id = ?2 AND status = 'ACTIVE' AND role = ?3",
            params![circle.to_string(), user.to_string(), from.as_str(), to.as_str()],
        )?;
        Ok(changed as u64)
    }

    fn insert_invite(&mut self, invite: &CircleInvite) -> Result<()> {
        self.tx.execute(
            "INSERT INTO circle_invites (
                id, circle_id, invited_by, invite_code, expires_at, max_uses, used_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                invite.id.to_string(),
                invite.circle_id.to_string(),
                invite.invited_by.map(|u| u.to_string()),
                invite.invite_code,
                millis(invite.expires_at),
                invite.max_uses,
                invite.used_count,
                millis(invite.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_invite(&mut self, id: InviteId) -> Result<Option<CircleInvite>> {
        Ok(self
            .tx
            .query_row(
                "SELECT * FROM circle_invites WHERE id = ?1",
                params![id.to_string()],
                row_to_invite,
            )
            .optional()?)
    }

    fn find_invite_by_code(&mut self, code: &str) -> Result<Option<CircleInvite>> {
        Ok(self
            .tx
            .query_row(
                "SELECT * FROM circle_invites WHERE invite_code = ?1",
                params![code],
                row_to_invite,
            )
            .optional()?)
    }

    fn increment_invite_use(&mut self, id: InviteId) -> Result<u64> {
        let changed = self.tx.execute(
            "UPDATE circle_invites SET used_count = used_count + 1
             WHERE id = ?1 AND used_count < max_uses",
            params![id.to_string()],
        )?;
        Ok(changed as u64)
    }

    fn insert_entry(&mut self, entry: &Entry) -> Result<()> {
        self.tx.execute(
            "INSERT INTO entries (
                id, author_id, content_encrypted, visibility, circle_id,
                version, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id.to_string(),
                entry.author_id.to_string(),
                &entry.content_encrypted[..],
                entry.visibility.as_str(),
                entry.circle_id.map(|c| c.to_string()),
                entry.version,
                millis(entry.created_at),
                millis(entry.updated_at),
                entry.deleted_at.map(millis),
            ],
        )?;
        Ok(())
    }

    fn get_entry(&mut self, id: EntryId) -> Result<Option<Entry>> {
        Ok(self
            .tx
            .query_row(
                "SELECT * FROM entries WHERE id = ?1",
                params![id.to_string()],
                row_to_entry,
            )
            .optional()?)
    }

    fn update_entry_versioned(&mut self, update: &VersionedUpdate) -> Result<u64> {
        let changed = self.tx.execute(
            "UPDATE entries
             SET content_encrypted = COALESCE(?4, content_encrypted),
                 visibility = ?5,
                 circle_id = ?6,
                 updated_at = ?7,
                 version = version + 1
             WHERE id = ?1 AND author_id = ?2 AND version = ?3 AND deleted_at IS NULL",
            params![
                update.id.to_string(),
                update.author_id.to_string(),
                update.expected_version,
                update.content_encrypted.as_ref().map(|b| &b[..]),
                update.visibility.as_str(),
                update.circle_id.map(|c| c.to_string()),
                millis(update.updated_at),
            ],
        )?;
        Ok(changed as u64)
    }

    fn set_entry_deleted(&mut self, id: EntryId, deleted_at: Option<DateTime<Utc>>) -> Result<u64> {
        let changed = match deleted_at {
            Some(at) => self.tx.execute(
                "UPDATE entries SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![id.to_string(), millis(at)],
            )?,
            None => self.tx.execute(
                "UPDATE entries SET deleted_at = NULL WHERE id = ?1 AND deleted_at IS NOT NULL",
                params![id.to_string()],
            )?,
        };
        Ok(changed as u64)
    }

    fn insert_notification(&mut self, notification: &Notification) -> Result<()> {
        self.tx.execute(
            "INSERT INTO notifications (id, user_id, kind, title, body, data, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                notification.id.to_string(),
                notification.user_id.to_string(),
                notification.kind.as_str(),
                notification.title,
                notification.body,
                notification.data,
                notification.read,
                millis(notification.created_at),
            ],
        )?;
        Ok(())
    }

    fn notifications_for(&mut self, user: UserId) -> Result<Vec<Notification>> {
        let mut stmt = self
            .tx
            .prepare("SELECT * FROM notifications WHERE user_id = ?1 ORDER BY created_at")?;
        let rows = stmt
            .query_map(params![user.to_string()], row_to_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
