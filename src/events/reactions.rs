use futures::future::BoxFuture;

use super::{Event, Outcome};
use crate::error::{AppError, Result};
use crate::membership;
use crate::store::StoreTx;

/// Reaction to `GroupCreated`: the creator becomes the group's one
/// administrator, and the membership is handed back to the emitter.
pub(super) fn assign_creator_admin<'a>(
    tx: &'a mut dyn StoreTx,
    event: &'a Event,
) -> BoxFuture<'a, Result<Outcome>> {
    Box::pin(async move {
        let Event::GroupCreated { user, group } = event else {
            return Err(AppError::Internal(
                "assign_creator_admin wired to the wrong event".into(),
            ));
        };
        let administrator = membership::set_group_admin(tx, *user, group.id).await?;
        Ok(Outcome::Administrator(administrator))
    })
}

/// Reaction to `GroupAndMembershipsRemove`: verify the actor is the
/// current administrator, then delete the group with all its memberships.
/// Anyone else gets `Removed(false)` and no writes.
pub(super) fn remove_group_and_memberships<'a>(
    tx: &'a mut dyn StoreTx,
    event: &'a Event,
) -> BoxFuture<'a, Result<Outcome>> {
    Box::pin(async move {
        let Event::GroupAndMembershipsRemove { user, group } = event else {
            return Err(AppError::Internal(
                "remove_group_and_memberships wired to the wrong event".into(),
            ));
        };
        let Some(actor) = user else {
            return Ok(Outcome::Removed(false));
        };
        match tx.admin_membership(group.id).await? {
            Some(admin) if admin.member_id == *actor => {
                tx.delete_group_memberships(group.id).await?;
                let deleted = tx.delete_group(group.id).await?;
                Ok(Outcome::Removed(deleted))
            }
            _ => Ok(Outcome::Removed(false)),
        }
    })
}
