use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use super::group_models::{CreateGroupRequest, Group, PRIVATE, PUBLIC};
use crate::cache::keys::{cache_bust, make_key, CacheKind};
use crate::cache::{read_through, Cache};
use crate::error::{AppError, Result};
use crate::events::{Event, EventBus, Outcome};
use crate::membership::Membership;
use crate::store::Store;

#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    events: Arc<EventBus>,
}

impl GroupService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>, events: Arc<EventBus>) -> Self {
        Self { store, cache, events }
    }

    /// Create a group and assign `creator` as its administrator. The
    /// administrator membership is produced by the `GroupCreated` reaction
    /// inside the same transaction.
    pub async fn create_group(
        &self,
        creator: Uuid,
        name: &str,
        access: &str,
    ) -> Result<(Group, Membership)> {
        CreateGroupRequest {
            name: name.to_string(),
            access: access.to_string(),
        }
        .validate()?;
        if access != PUBLIC && access != PRIVATE {
            return Err(AppError::InvalidAccessMode(access.to_string()));
        }

        let mut tx = self.store.begin().await?;
        if tx.group_name_exists(name).await? {
            return Err(AppError::DuplicateName(name.to_string()));
        }
        let group = tx.insert_group(name, access, Utc::now()).await?;

        let outcomes = self
            .events
            .emit(
                &mut *tx,
                &Event::GroupCreated { user: creator, group: group.clone() },
            )
            .await?;
        let administrator = outcomes
            .into_iter()
            .find_map(|outcome| match outcome {
                Outcome::Administrator(membership) => Some(membership),
                _ => None,
            })
            .ok_or_else(|| {
                AppError::Internal("no reaction assigned a group administrator".into())
            })?;
        tx.commit().await?;

        cache_bust(self.cache.as_ref(), &[(CacheKind::Groups, creator)]).await?;
        tracing::info!(group_id = %group.id, %creator, name, "group created");
        Ok((group, administrator))
    }

    /// Remove a group together with all its memberships. The
    /// `GroupAndMembershipsRemove` reaction verifies the requester is the
    /// current administrator; anyone else gets `false` and no writes.
    pub async fn remove_group(&self, requester: Option<Uuid>, group_id: Uuid) -> Result<bool> {
        let mut tx = self.store.begin().await?;
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

        let mut busts = vec![(CacheKind::Memberships, group_id)];
        if let Some(requester) = requester {
            busts.push((CacheKind::Groups, requester));
        }
        cache_bust(self.cache.as_ref(), &busts).await?;
        tracing::info!(%group_id, "group removed");
        Ok(true)
    }

    /// Groups the user belongs to, most recently joined first.
    pub async fn get_user_groups(&self, user: Uuid) -> Result<Vec<Group>> {
        let key = make_key(CacheKind::Groups, user);
        let store = self.store.clone();
        read_through(self.cache.as_ref(), &key, move || async move {
            let mut tx = store.begin().await?;
            let groups = tx.groups_of_user(user).await?;
            tx.rollback().await?;
            Ok(groups)
        })
        .await
    }

    /// Derived from the cached group list, never an independent entry.
    pub async fn count_user_groups(&self, user: Uuid) -> Result<usize> {
        Ok(self.get_user_groups(user).await?.len())
    }
}
