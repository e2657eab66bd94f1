//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.
//!
//! Identifiers are stored as hyphenated UUID text, timestamps as Unix
//! milliseconds.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, crate::now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: relational schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE partner_links (
            id TEXT PRIMARY KEY,
            initiator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            partner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status TEXT NOT NULL,             -- PENDING | ACTIVE | DECLINED | REVOKED
            initiated_at INTEGER NOT NULL,
            responded_at INTEGER,
            revoked_at INTEGER,
            revoked_by TEXT
        );

        CREATE TABLE circles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            created_by TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            max_members INTEGER NOT NULL DEFAULT 20,
            created_at INTEGER NOT NULL
        );

        -- One row per (circle, user); re-joining reactivates the row.
        CREATE TABLE circle_memberships (
            id TEXT PRIMARY KEY,
            circle_id TEXT NOT NULL REFERENCES circles(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'MEMBER',
            status TEXT NOT NULL,             -- ACTIVE | LEFT | REMOVED
            joined_at INTEGER NOT NULL,
            left_at INTEGER,
            history_policy TEXT NOT NULL,     -- ALL | FUTURE_ONLY
            UNIQUE(circle_id, user_id)
        );

        CREATE TABLE circle_invites (
            id TEXT PRIMARY KEY,
            circle_id TEXT NOT NULL REFERENCES circles(id) ON DELETE CASCADE,
            invited_by TEXT,
            invite_code TEXT NOT NULL UNIQUE,
            expires_at INTEGER NOT NULL,
            max_uses INTEGER NOT NULL DEFAULT 1,
            used_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            CHECK (used_count <= max_uses)
        );

        CREATE TABLE entries (
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            content_encrypted BLOB NOT NULL,
            visibility TEXT NOT NULL,
            circle_id TEXT REFERENCES circles(id) ON DELETE RESTRICT,
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );

        CREATE TABLE notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT,
            data TEXT,
            read INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX idx_partner_links_initiator ON partner_links(initiator_id, status);
        CREATE INDEX idx_partner_links_partner ON partner_links(partner_id, status);
        CREATE INDEX idx_memberships_user ON circle_memberships(user_id);
        CREATE INDEX idx_invites_circle ON circle_invites(circle_id);
        CREATE INDEX idx_entries_author ON entries(author_id);
        CREATE INDEX idx_entries_circle ON entries(circle_id);
        CREATE INDEX idx_notifications_user ON notifications(user_id, read, created_at);
        "#,
    )?;

    Ok(())
}

/// Migration v2: TTL key-value table.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at INTEGER NOT NULL       -- Unix ms; rows at or past this are dead
        );

        CREATE INDEX idx_kv_expires ON kv(expires_at);
        "#,
    )?;

    Ok(())
}
