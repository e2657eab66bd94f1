//! Loading the viewer context the access evaluator needs.

use innera_core::UserId;
use innera_perms::Viewer;
use innera_store::{Store, StoreTx};

use crate::error::Result;

/// Assemble `user`'s viewer from inside a transaction.
pub fn load_viewer_tx(tx: &mut dyn StoreTx, user: UserId) -> Result<Viewer> {
    let link = tx.open_link_for(user)?;
    let memberships = tx.memberships_for_user(user)?;
    Ok(Viewer::from_rows(user, link.as_ref(), &memberships))
}

/// Assemble `user`'s viewer: open partner link plus every membership row.
pub async fn load_viewer<S: Store>(store: &S, user: UserId) -> Result<Viewer> {
    store.transaction(move |tx| load_viewer_tx(tx, user)).await
}
