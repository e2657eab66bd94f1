//! Entry visibility evaluation.

use innera_core::{Entry, HistoryPolicy, Visibility};

use crate::viewer::Viewer;

/// Whether `viewer` may read `entry`.
///
/// - The author always passes.
/// - `PRIVATE`: author only.
/// - `PARTNER`: the viewer's ACTIVE partner is the author.
/// - `CIRCLE`: ACTIVE membership in the entry's circle; a `FUTURE_ONLY`
///   membership additionally requires the entry to postdate the join.
/// - `FUTURE_CIRCLE_ONLY`: ACTIVE membership and the entry postdates the join,
///   whatever the membership's history policy.
/// - Anything else is denied.
///
/// Soft deletion is not considered here; callers treat deleted entries as missing.
pub fn can_view(entry: &Entry, viewer: &Viewer) -> bool {
    if entry.author_id == viewer.user_id {
        return true;
    }

    match &entry.visibility {
        Visibility::Private => false,
        Visibility::Partner => viewer.is_active_partner_of(entry.author_id),
        Visibility::Circle => {
            let Some(membership) = entry.circle_id.and_then(|c| viewer.active_membership(c)) else {
                return false;
            };
            match membership.history_policy {
                HistoryPolicy::All => true,
                HistoryPolicy::FutureOnly => entry.created_at >= membership.joined_at,
            }
        }
        Visibility::FutureCircleOnly => entry
            .circle_id
            .and_then(|c| viewer.active_membership(c))
            .is_some_and(|m| entry.created_at >= m.joined_at),
        Visibility::Unrecognized(_) => false,
    }
}
