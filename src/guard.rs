//! Administrator permission guard wrapping administrator-only operations.

use uuid::Uuid;

use crate::error::Result;
use crate::store::StoreTx;

/// Decide whether `actor` may run an administrator-only operation
/// addressed to `to_administrator` on the given group. The current
/// administrator is resolved fresh from the store; the actor must be
/// authenticated, must equal the operation's designated recipient, and
/// must equal the resolved administrator. Fails closed with `false` so
/// callers cannot tell "not found" from "not authorized".
pub async fn admin_permit(
    tx: &mut dyn StoreTx,
    actor: Option<Uuid>,
    to_administrator: Uuid,
    group_id: Uuid,
) -> Result<bool> {
    let Some(actor) = actor else {
        return Ok(false);
    };
    if actor != to_administrator {
        return Ok(false);
    }
    let current_admin = tx.admin_membership(group_id).await?.map(|m| m.member_id);
    Ok(current_admin == Some(actor))
}
