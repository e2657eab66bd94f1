//! Edit, delete, and circle management rules.

use innera_core::{CircleId, CircleRole, Entry};

use crate::viewer::Viewer;

/// Only the author edits an entry.
pub fn can_edit(entry: &Entry, viewer: &Viewer) -> bool {
    entry.author_id == viewer.user_id
}

/// The author deletes; for circle-scoped entries an ACTIVE owner or admin of
/// the entry's circle may delete too.
pub fn can_delete(entry: &Entry, viewer: &Viewer) -> bool {
    if entry.author_id == viewer.user_id {
        return true;
    }
    if !entry.visibility.is_circle_scoped() {
        return false;
    }
    entry
        .circle_id
        .and_then(|c| viewer.active_membership(c))
        .is_some_and(|m| m.role.is_moderator())
}

/// Only the author may undo a soft delete.
pub fn can_restore(entry: &Entry, viewer: &Viewer) -> bool {
    entry.author_id == viewer.user_id
}

/// Invites, archival, and ownership transfer are owner-only.
pub fn can_manage_circle(viewer: &Viewer, circle_id: CircleId) -> bool {
    viewer
        .active_membership(circle_id)
        .is_some_and(|m| m.role == CircleRole::Owner)
}

/// Whether the viewer may remove a member holding `target_role`.
pub fn can_kick_member(viewer: &Viewer, circle_id: CircleId, target_role: CircleRole) -> bool {
    viewer
        .active_membership(circle_id)
        .is_some_and(|m| m.role.can_remove(target_role))
}

/// Whether the viewer may post entries into the circle.
pub fn can_post_to_circle(viewer: &Viewer, circle_id: CircleId) -> bool {
    viewer.active_membership(circle_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::MembershipContext;
    use bytes::Bytes;
    use chrono::Utc;
    use innera_core::{EntryId, HistoryPolicy, MembershipStatus, UserId, Visibility};

    fn member(role: CircleRole) -> MembershipContext {
        MembershipContext {
            role,
            status: MembershipStatus::Active,
            history_policy: HistoryPolicy::All,
            joined_at: Utc::now(),
        }
    }

    fn circle_entry(circle: CircleId) -> Entry {
        let now = Utc::now();
        Entry {
            id: EntryId::new(),
            author_id: UserId::new(),
            content_encrypted: Bytes::new(),
            visibility: Visibility::Circle,
            circle_id: Some(circle),
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_edit_is_author_only() {
        let circle = CircleId::new();
        let e = circle_entry(circle);
        assert!(can_edit(&e, &Viewer::new(e.author_id)));
        let owner = Viewer::new(UserId::new()).with_membership(circle, member(CircleRole::Owner));
        assert!(!can_edit(&e, &owner));
    }

    #[test]
    fn test_moderators_delete_circle_entries() {
        let circle = CircleId::new();
        let e = circle_entry(circle);
        for (role, allowed) in [
            (CircleRole::Owner, true),
            (CircleRole::Admin, true),
            (CircleRole::Member, false),
        ] {
            let viewer = Viewer::new(UserId::new()).with_membership(circle, member(role));
            assert_eq!(can_delete(&e, &viewer), allowed, "{:?}", role);
        }

        let mut removed = member(CircleRole::Owner);
        removed.status = MembershipStatus::Removed;
        let viewer = Viewer::new(UserId::new()).with_membership(circle, removed);
        assert!(!can_delete(&e, &viewer));
    }

    #[test]
    fn test_moderators_cannot_delete_partner_entries() {
        let circle = CircleId::new();
        let mut e = circle_entry(circle);
        e.visibility = Visibility::Partner;
        e.circle_id = None;
        let owner = Viewer::new(UserId::new()).with_membership(circle, member(CircleRole::Owner));
        assert!(!can_delete(&e, &owner));
    }

    #[test]
    fn test_kick_rules() {
        let circle = CircleId::new();
        let owner = Viewer::new(UserId::new()).with_membership(circle, member(CircleRole::Owner));
        let admin = Viewer::new(UserId::new()).with_membership(circle, member(CircleRole::Admin));
        let plain = Viewer::new(UserId::new()).with_membership(circle, member(CircleRole::Member));

        assert!(can_kick_member(&owner, circle, CircleRole::Admin));
        assert!(!can_kick_member(&owner, circle, CircleRole::Owner));
        assert!(can_kick_member(&admin, circle, CircleRole::Member));
        assert!(!can_kick_member(&admin, circle, CircleRole::Admin));
        assert!(!can_kick_member(&plain, circle, CircleRole::Member));
        assert!(!can_kick_member(&owner, CircleId::new(), CircleRole::Member));
    }

    #[test]
    fn test_manage_is_owner_only() {
        let circle = CircleId::new();
        let owner = Viewer::new(UserId::new()).with_membership(circle, member(CircleRole::Owner));
        let admin = Viewer::new(UserId::new()).with_membership(circle, member(CircleRole::Admin));
        assert!(can_manage_circle(&owner, circle));
        assert!(!can_manage_circle(&admin, circle));
        assert!(can_post_to_circle(&admin, circle));
    }
}
