//! Journal entries.
//!
//! Entry content is an opaque encrypted blob; nothing in this workspace reads it.
//! The `version` stamp starts at 1 and increases by exactly one per accepted update.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{CircleId, EntryId, UserId};

/// Access tier of an entry.
///
/// Values read from storage that this build does not recognize are kept as
/// [`Visibility::Unrecognized`] so the access evaluator can deny them instead
/// of failing the read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Visibility {
    Private,
    Partner,
    Circle,
    FutureCircleOnly,
    Unrecognized(String),
}

impl Visibility {
    pub fn as_str(&self) -> &str {
        match self {
            Visibility::Private => "PRIVATE",
            Visibility::Partner => "PARTNER",
            Visibility::Circle => "CIRCLE",
            Visibility::FutureCircleOnly => "FUTURE_CIRCLE_ONLY",
            Visibility::Unrecognized(raw) => raw,
        }
    }

    /// Parse a stored value, keeping unknown values instead of rejecting them.
    pub fn from_stored(raw: &str) -> Self {
        match raw {
            "PRIVATE" => Visibility::Private,
            "PARTNER" => Visibility::Partner,
            "CIRCLE" => Visibility::Circle,
            "FUTURE_CIRCLE_ONLY" => Visibility::FutureCircleOnly,
            other => Visibility::Unrecognized(other.to_string()),
        }
    }

    /// Whether entries with this visibility must name a circle.
    pub fn is_circle_scoped(&self) -> bool {
        matches!(self, Visibility::Circle | Visibility::FutureCircleOnly)
    }
}

impl FromStr for Visibility {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Visibility::from_stored(s) {
            Visibility::Unrecognized(value) => Err(CoreError::UnknownVariant {
                kind: "visibility",
                value,
            }),
            known => Ok(known),
        }
    }
}

impl From<String> for Visibility {
    fn from(raw: String) -> Self {
        Visibility::from_stored(&raw)
    }
}

impl From<Visibility> for String {
    fn from(v: Visibility) -> Self {
        v.as_str().to_string()
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    pub author_id: UserId,
    pub content_encrypted: Bytes,
    pub visibility: Visibility,
    pub circle_id: Option<CircleId>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Check the circle/visibility pairing.
    ///
    /// A circle id is present iff the visibility is circle-scoped. Unrecognized
    /// visibilities are never valid for new writes.
    pub fn validate_scope(visibility: &Visibility, circle_id: Option<CircleId>) -> Result<(), CoreError> {
        match (visibility, circle_id) {
            (Visibility::Unrecognized(raw), _) => Err(CoreError::UnknownVariant {
                kind: "visibility",
                value: raw.clone(),
            }),
            (v, None) if v.is_circle_scoped() => Err(CoreError::MissingCircle),
            (v, Some(_)) if !v.is_circle_scoped() => Err(CoreError::UnexpectedCircle(v.to_string())),
            _ => Ok(()),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for creating an entry.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub author_id: UserId,
    pub content_encrypted: Bytes,
    pub visibility: Visibility,
    pub circle_id: Option<CircleId>,
}

impl NewEntry {
    /// Build the stored row, starting at version 1.
    pub fn into_entry(self, now: DateTime<Utc>) -> Result<Entry, CoreError> {
        Entry::validate_scope(&self.visibility, self.circle_id)?;
        Ok(Entry {
            id: EntryId::new(),
            author_id: self.author_id,
            content_encrypted: self.content_encrypted,
            visibility: self.visibility,
            circle_id: self.circle_id,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }
}

/// Fields an author may change on an entry.
///
/// When `visibility` is set, `circle_id` is the complete new circle binding
/// (`None` clears it). When only `circle_id` is set, the entry moves to that
/// circle and keeps its visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPatch {
    pub content_encrypted: Option<Bytes>,
    pub visibility: Option<Visibility>,
    pub circle_id: Option<CircleId>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.content_encrypted.is_none() && self.visibility.is_none() && self.circle_id.is_none()
    }

    /// Resolve the visibility and circle binding this patch leaves on `entry`.
    pub fn resolve_scope(&self, entry: &Entry) -> Result<(Visibility, Option<CircleId>), CoreError> {
        let resolved = match &self.visibility {
            Some(v) => (v.clone(), self.circle_id),
            None => (entry.visibility.clone(), self.circle_id.or(entry.circle_id)),
        };
        Entry::validate_scope(&resolved.0, resolved.1)?;
        Ok(resolved)
    }

    /// Whether this patch touches the visibility or circle binding.
    pub fn changes_scope(&self) -> bool {
        self.visibility.is_some() || self.circle_id.is_some()
    }
}
