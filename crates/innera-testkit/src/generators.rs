//! Proptest generators for property-based testing.

use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use innera_core::{
    CircleId, CircleRole, Entry, EntryId, HistoryPolicy, LinkStatus, MembershipStatus, UserId,
    Visibility,
};
use innera_perms::{MembershipContext, Viewer};

/// Generate a random UserId.
pub fn user_id() -> impl Strategy<Value = UserId> {
    any::<u128>().prop_map(|n| UserId::from(Uuid::from_u128(n)))
}

/// Generate a random CircleId.
pub fn circle_id() -> impl Strategy<Value = CircleId> {
    any::<u128>().prop_map(|n| CircleId::from(Uuid::from_u128(n)))
}

/// A timestamp within a few years of 2024.
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..100_000_000).prop_map(|secs| {
        Utc.timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .unwrap_or_else(Utc::now)
    })
}

/// Every recognized visibility.
pub fn known_visibility() -> impl Strategy<Value = Visibility> {
    prop_oneof![
        Just(Visibility::Private),
        Just(Visibility::Partner),
        Just(Visibility::Circle),
        Just(Visibility::FutureCircleOnly),
    ]
}

/// Stored values no reader recognizes.
pub fn unrecognized_visibility() -> impl Strategy<Value = Visibility> {
    "[A-Z_]{1,24}"
        .prop_filter("must not be a known visibility", |raw| {
            !matches!(raw.as_str(), "PRIVATE" | "PARTNER" | "CIRCLE" | "FUTURE_CIRCLE_ONLY")
        })
        .prop_map(Visibility::Unrecognized)
}

pub fn link_status() -> impl Strategy<Value = LinkStatus> {
    prop_oneof![
        Just(LinkStatus::Pending),
        Just(LinkStatus::Active),
        Just(LinkStatus::Declined),
        Just(LinkStatus::Revoked),
    ]
}

pub fn circle_role() -> impl Strategy<Value = CircleRole> {
    prop_oneof![
        Just(CircleRole::Owner),
        Just(CircleRole::Admin),
        Just(CircleRole::Member),
    ]
}

pub fn membership_status() -> impl Strategy<Value = MembershipStatus> {
    prop_oneof![
        Just(MembershipStatus::Active),
        Just(MembershipStatus::Left),
        Just(MembershipStatus::Removed),
    ]
}

pub fn history_policy() -> impl Strategy<Value = HistoryPolicy> {
    prop_oneof![Just(HistoryPolicy::All), Just(HistoryPolicy::FutureOnly)]
}

/// A stored entry with the given visibility, bound to a circle exactly when
/// the visibility is circle-scoped.
pub fn entry_with(visibility: impl Strategy<Value = Visibility>) -> impl Strategy<Value = Entry> {
    (user_id(), circle_id(), visibility, timestamp(), 1i64..50).prop_map(
        |(author, circle, visibility, created_at, version)| Entry {
            id: EntryId::new(),
            author_id: author,
            content_encrypted: Bytes::from_static(b"ciphertext"),
            circle_id: visibility.is_circle_scoped().then_some(circle),
            visibility,
            version,
            created_at,
            updated_at: created_at,
            deleted_at: None,
        },
    )
}

/// A viewer with an arbitrary partner link and up to three memberships.
///
/// `circles` seeds membership keys so generated viewers can actually be
/// members of the circle an entry points at.
pub fn viewer(circles: Vec<CircleId>) -> impl Strategy<Value = Viewer> {
    let membership = (circle_role(), membership_status(), history_policy(), timestamp()).prop_map(
        |(role, status, history_policy, joined_at)| MembershipContext {
            role,
            status,
            history_policy,
            joined_at,
        },
    );
    (
        user_id(),
        proptest::option::of((user_id(), link_status())),
        proptest::collection::vec((proptest::sample::select(circles), membership), 0..=3),
    )
        .prop_map(|(user, partner, memberships)| {
            let mut viewer = Viewer::new(user);
            if let Some((partner_id, status)) = partner {
                viewer = viewer.with_partner(partner_id, status);
            }
            for (circle, m) in memberships {
                viewer = viewer.with_membership(circle, m);
            }
            viewer
        })
}

/// Offsets around a join date: negative is before joining.
pub fn join_offset() -> impl Strategy<Value = Duration> {
    (-86_400i64..86_400).prop_map(Duration::seconds)
}
