use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::membership_models::{Membership, NavigationTarget, ADMIN, PARTICIPANT};
use crate::cache::keys::{cache_bust, make_key, CacheKind};
use crate::cache::{read_through, Cache};
use crate::error::{AppError, Result};
use crate::events::{Event, EventBus, Outcome};
use crate::group::{PRIVATE, PUBLIC};
use crate::store::{Store, StoreTx};

/// Resolve the group's current administrator, fresh from the store.
pub async fn get_group_admin(tx: &mut dyn StoreTx, group_id: Uuid) -> Result<Membership> {
    tx.admin_membership(group_id)
        .await?
        .ok_or(AppError::NoAdministrator(group_id))
}

/// Create the ADMIN membership for a newly created group. Wired as the
/// reaction to `GroupCreated`; a group can only ever gain one.
pub async fn set_group_admin(
    tx: &mut dyn StoreTx,
    user: Uuid,
    group_id: Uuid,
) -> Result<Membership> {
    if tx.admin_membership(group_id).await?.is_some() {
        return Err(AppError::DuplicateAdministrator(group_id));
    }
    tx.insert_membership(user, group_id, ADMIN, Utc::now()).await
}

#[derive(Clone)]
pub struct MembershipService {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    events: Arc<EventBus>,
}

impl MembershipService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>, events: Arc<EventBus>) -> Self {
        Self { store, cache, events }
    }

    /// Join a group. Public groups admit the user immediately as a
    /// participant; private groups perform no writes and route the caller
    /// to the request-submission flow.
    pub async fn add_membership(&self, user: Uuid, group_id: Uuid) -> Result<NavigationTarget> {
        if self.is_member(Some(user), group_id).await? {
            return Err(AppError::AlreadyMember);
        }

        let mut tx = self.store.begin().await?;
        let group = tx
            .group_by_id(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {group_id}")))?;
        match group.access.as_str() {
            PUBLIC => {
                let membership = tx
                    .insert_membership(user, group_id, PARTICIPANT, Utc::now())
                    .await?;
                self.events
                    .emit(&mut *tx, &Event::MembershipCreated { user, group_id })
                    .await?;
                tx.commit().await?;
                cache_bust(
                    self.cache.as_ref(),
                    &[(CacheKind::Groups, user), (CacheKind::Memberships, group_id)],
                )
                .await?;
                tracing::info!(%user, %group_id, membership_id = %membership.id, "membership created");
                Ok(NavigationTarget::GroupDetail(group_id))
            }
            PRIVATE => Ok(NavigationTarget::MembershipRequestForm(group_id)),
            other => Err(AppError::InvalidAccessMode(other.to_string())),
        }
    }

    /// The group's administrator membership.
    pub async fn get_group_admin(&self, group_id: Uuid) -> Result<Membership> {
        let mut tx = self.store.begin().await?;
        let admin = get_group_admin(&mut *tx, group_id).await;
        tx.rollback().await?;
        admin
    }

    /// Remove a membership. A member may leave, the administrator may
    /// remove another member, and an administrator leaving dissolves the
    /// whole group. Every other combination is denied silently.
    pub async fn remove_membership(
        &self,
        requester: Option<Uuid>,
        membership_id: Uuid,
    ) -> Result<bool> {
        let Some(actor) = requester else {
            return Ok(false);
        };

        let mut tx = self.store.begin().await?;
        let Some(membership) = tx.membership_by_id(membership_id).await? else {
            return Ok(false);
        };
        let group_id = membership.group_id;
        let admin = tx.admin_membership(group_id).await?.map(|m| m.member_id);
        let is_self = actor == membership.member_id;
        let is_admin = admin == Some(actor);

        if is_self && is_admin {
            // The administrator leaving dissolves the group entirely.
            let Some(group) = tx.group_by_id(group_id).await? else {
                return Ok(false);
            };
            let outcomes = self
                .events
                .emit(
                    &mut *tx,
                    &Event::GroupAndMembershipsRemove { user: requester, group },
                )
                .await?;
            let removed = outcomes
                .iter()
                .any(|outcome| matches!(outcome, Outcome::Removed(true)));
            if !removed {
                tx.rollback().await?;
                return Ok(false);
            }
            tx.commit().await?;
            cache_bust(
                self.cache.as_ref(),
                &[(CacheKind::Groups, actor), (CacheKind::Memberships, group_id)],
            )
            .await?;
            tracing::info!(%group_id, "administrator left, group dissolved");
            return Ok(true);
        }

        if is_self || is_admin {
            if !tx.delete_membership(membership_id).await? {
                tx.rollback().await?;
                return Ok(false);
            }
            tx.commit().await?;
            cache_bust(
                self.cache.as_ref(),
                &[(CacheKind::Groups, actor), (CacheKind::Memberships, group_id)],
            )
            .await?;
            tracing::info!(%membership_id, %group_id, "membership removed");
            return Ok(true);
        }

        Ok(false)
    }

    /// All memberships of a group plus the member list projected from
    /// them. The member list is never cached independently of the
    /// membership list, so the two cannot drift apart.
    pub async fn memberships(&self, group_id: Uuid) -> Result<(Vec<Membership>, Vec<Uuid>)> {
        let memberships_key = make_key(CacheKind::Memberships, group_id);
        let store = self.store.clone();
        let memberships: Vec<Membership> =
            read_through(self.cache.as_ref(), &memberships_key, move || async move {
                let mut tx = store.begin().await?;
                let memberships = tx.memberships_of_group(group_id).await?;
                tx.rollback().await?;
                Ok(memberships)
            })
            .await?;

        let members: Vec<Uuid> = memberships.iter().map(|m| m.member_id).collect();
        let members_key = make_key(CacheKind::Members, group_id);
        match serde_json::to_string(&members) {
            Ok(raw) => {
                if let Err(err) = self.cache.set(&members_key, raw).await {
                    tracing::warn!(key = %members_key, %err, "failed to cache member list");
                }
            }
            Err(err) => tracing::warn!(%err, "failed to encode member list"),
        }
        Ok((memberships, members))
    }

    /// Membership check with a cached fast path; a miss falls back to the
    /// store. Unauthenticated callers are never members.
    pub async fn is_member(&self, user: Option<Uuid>, group_id: Uuid) -> Result<bool> {
        let Some(user) = user else {
            return Ok(false);
        };

        let key = make_key(CacheKind::Members, group_id);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => {
                if let Ok(members) = serde_json::from_str::<Vec<Uuid>>(&raw) {
                    if members.contains(&user) {
                        return Ok(true);
                    }
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(key = %key, %err, "cache read failed, falling back to store"),
        }

        let mut tx = self.store.begin().await?;
        let exists = tx.membership_exists(user, group_id).await?;
        tx.rollback().await?;
        Ok(exists)
    }

    /// Derived from the cached membership list.
    pub async fn count_group_members(&self, group_id: Uuid) -> Result<usize> {
        let (memberships, _members) = self.memberships(group_id).await?;
        Ok(memberships.len())
    }
}
