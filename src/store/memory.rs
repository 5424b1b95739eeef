use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{RequestFilter, Store, StoreTx};
use crate::error::{AppError, Result};
use crate::group::Group;
use crate::membership::{Membership, ADMIN};
use crate::request::MembershipRequest;

/// In-memory backend. A transaction owns the state lock, so transactions
/// serialize; the snapshot taken at `begin` is restored when the handle is
/// dropped without a commit.
#[derive(Default)]
pub struct MemStore {
    state: Arc<Mutex<MemState>>,
}

#[derive(Default, Clone)]
struct MemState {
    groups: HashMap<Uuid, Group>,
    memberships: HashMap<Uuid, Membership>,
    requests: HashMap<Uuid, MembershipRequest>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = Some(guard.clone());
        Ok(Box::new(MemTx { guard, snapshot }))
    }
}

pub struct MemTx {
    guard: OwnedMutexGuard<MemState>,
    snapshot: Option<MemState>,
}

impl Drop for MemTx {
    fn drop(&mut self) {
        // A transaction that was never committed restores the snapshot.
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

fn matches_filter(request: &MembershipRequest, filter: RequestFilter) -> bool {
    match filter {
        RequestFilter::All => true,
        RequestFilter::Rejected => request.rejected.is_some(),
        RequestFilter::Unrejected => request.rejected.is_none(),
        RequestFilter::Viewed => request.viewed.is_some(),
        RequestFilter::Unviewed => request.viewed.is_none(),
    }
}

#[async_trait]
impl StoreTx for MemTx {
    async fn insert_group(
        &mut self,
        name: &str,
        access: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Group> {
        if self.guard.groups.values().any(|g| g.name == name) {
            return Err(AppError::DuplicateName(name.to_string()));
        }
        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            access: access.to_string(),
            created_at,
        };
        self.guard.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn group_by_id(&mut self, group_id: Uuid) -> Result<Option<Group>> {
        Ok(self.guard.groups.get(&group_id).cloned())
    }

    async fn group_name_exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.guard.groups.values().any(|g| g.name == name))
    }

    async fn delete_group(&mut self, group_id: Uuid) -> Result<bool> {
        let removed = self.guard.groups.remove(&group_id).is_some();
        if removed {
            // Foreign keys cascade on group deletion.
            self.guard.memberships.retain(|_, m| m.group_id != group_id);
            self.guard.requests.retain(|_, r| r.group_id != group_id);
        }
        Ok(removed)
    }

    async fn groups_of_user(&mut self, user_id: Uuid) -> Result<Vec<Group>> {
        let mut memberships: Vec<&Membership> = self
            .guard
            .memberships
            .values()
            .filter(|m| m.member_id == user_id)
            .collect();
        memberships.sort_by(|a, b| b.joined_at.cmp(&a.joined_at).then(a.id.cmp(&b.id)));
        Ok(memberships
            .iter()
            .filter_map(|m| self.guard.groups.get(&m.group_id).cloned())
            .collect())
    }

    async fn insert_membership(
        &mut self,
        member_id: Uuid,
        group_id: Uuid,
        permit: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<Membership> {
        if !self.guard.groups.contains_key(&group_id) {
            return Err(AppError::NotFound(format!("group {group_id}")));
        }
        if self
            .guard
            .memberships
            .values()
            .any(|m| m.member_id == member_id && m.group_id == group_id)
        {
            return Err(AppError::AlreadyMember);
        }
        if permit == ADMIN
            && self
                .guard
                .memberships
                .values()
                .any(|m| m.group_id == group_id && m.permit == ADMIN)
        {
            return Err(AppError::DuplicateAdministrator(group_id));
        }
        let membership = Membership {
            id: Uuid::new_v4(),
            member_id,
            group_id,
            permit: permit.to_string(),
            joined_at,
        };
        self.guard.memberships.insert(membership.id, membership.clone());
        Ok(membership)
    }

    async fn membership_by_id(&mut self, membership_id: Uuid) -> Result<Option<Membership>> {
        Ok(self.guard.memberships.get(&membership_id).cloned())
    }

    async fn membership_exists(&mut self, member_id: Uuid, group_id: Uuid) -> Result<bool> {
        Ok(self
            .guard
            .memberships
            .values()
            .any(|m| m.member_id == member_id && m.group_id == group_id))
    }

    async fn admin_membership(&mut self, group_id: Uuid) -> Result<Option<Membership>> {
        Ok(self
            .guard
            .memberships
            .values()
            .find(|m| m.group_id == group_id && m.permit == ADMIN)
            .cloned())
    }

    async fn memberships_of_group(&mut self, group_id: Uuid) -> Result<Vec<Membership>> {
        let mut memberships: Vec<Membership> = self
            .guard
            .memberships
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        memberships.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        Ok(memberships)
    }

    async fn delete_membership(&mut self, membership_id: Uuid) -> Result<bool> {
        Ok(self.guard.memberships.remove(&membership_id).is_some())
    }

    async fn delete_group_memberships(&mut self, group_id: Uuid) -> Result<u64> {
        let before = self.guard.memberships.len();
        self.guard.memberships.retain(|_, m| m.group_id != group_id);
        Ok((before - self.guard.memberships.len()) as u64)
    }

    async fn insert_request(
        &mut self,
        from_user: Uuid,
        to_administrator: Uuid,
        group_id: Uuid,
        message: &str,
        created_at: DateTime<Utc>,
    ) -> Result<MembershipRequest> {
        if !self.guard.groups.contains_key(&group_id) {
            return Err(AppError::NotFound(format!("group {group_id}")));
        }
        if self.guard.requests.values().any(|r| {
            r.from_user == from_user
                && r.to_administrator == to_administrator
                && r.group_id == group_id
        }) {
            return Err(AppError::DuplicateRequest);
        }
        let request = MembershipRequest {
            id: Uuid::new_v4(),
            from_user,
            to_administrator,
            group_id,
            message: message.to_string(),
            created_at,
            rejected: None,
            viewed: None,
        };
        self.guard.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn request_by_id(&mut self, request_id: Uuid) -> Result<Option<MembershipRequest>> {
        Ok(self.guard.requests.get(&request_id).cloned())
    }

    async fn request_exists(
        &mut self,
        from_user: Uuid,
        to_administrator: Uuid,
        group_id: Uuid,
    ) -> Result<bool> {
        Ok(self.guard.requests.values().any(|r| {
            r.from_user == from_user
                && r.to_administrator == to_administrator
                && r.group_id == group_id
        }))
    }

    async fn delete_request(&mut self, request_id: Uuid) -> Result<bool> {
        Ok(self.guard.requests.remove(&request_id).is_some())
    }

    async fn set_request_rejected(
        &mut self,
        request_id: Uuid,
        rejected: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let request = self
            .guard
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("membership request {request_id}")))?;
        request.rejected = rejected;
        Ok(())
    }

    async fn set_request_viewed(
        &mut self,
        request_id: Uuid,
        viewed: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let request = self
            .guard
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("membership request {request_id}")))?;
        request.viewed = viewed;
        Ok(())
    }

    async fn requests_to(
        &mut self,
        to_administrator: Uuid,
        filter: RequestFilter,
    ) -> Result<Vec<MembershipRequest>> {
        let mut requests: Vec<MembershipRequest> = self
            .guard
            .requests
            .values()
            .filter(|r| r.to_administrator == to_administrator && matches_filter(r, filter))
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(requests)
    }

    async fn requests_from(&mut self, from_user: Uuid) -> Result<Vec<MembershipRequest>> {
        let mut requests: Vec<MembershipRequest> = self
            .guard
            .requests
            .values()
            .filter(|r| r.from_user == from_user)
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(requests)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Drop restores the snapshot.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::PARTICIPANT;

    #[tokio::test]
    async fn uncommitted_transaction_rolls_back_on_drop() {
        let store = MemStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_group("Chess", "PUBLIC", Utc::now()).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.group_name_exists("Chess").await.unwrap());
    }

    #[tokio::test]
    async fn committed_writes_survive() {
        let store = MemStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_group("Chess", "PUBLIC", Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.group_name_exists("Chess").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_group_name_is_rejected() {
        let store = MemStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_group("Chess", "PUBLIC", Utc::now()).await.unwrap();
        let err = tx.insert_group("Chess", "PRIVATE", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateName(name) if name == "Chess"));
    }

    #[tokio::test]
    async fn second_admin_membership_is_rejected() {
        let store = MemStore::new();
        let mut tx = store.begin().await.unwrap();
        let group = tx.insert_group("Chess", "PUBLIC", Utc::now()).await.unwrap();
        tx.insert_membership(Uuid::new_v4(), group.id, ADMIN, Utc::now())
            .await
            .unwrap();
        let err = tx
            .insert_membership(Uuid::new_v4(), group.id, ADMIN, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateAdministrator(id) if id == group.id));
    }

    #[tokio::test]
    async fn duplicate_member_group_pair_is_rejected() {
        let store = MemStore::new();
        let mut tx = store.begin().await.unwrap();
        let group = tx.insert_group("Chess", "PUBLIC", Utc::now()).await.unwrap();
        let user = Uuid::new_v4();
        tx.insert_membership(user, group.id, PARTICIPANT, Utc::now())
            .await
            .unwrap();
        let err = tx
            .insert_membership(user, group.id, PARTICIPANT, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyMember));
    }

    #[tokio::test]
    async fn groups_of_user_orders_by_join_date_descending() {
        let store = MemStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = Uuid::new_v4();
        let older = tx.insert_group("Older", "PUBLIC", Utc::now()).await.unwrap();
        let newer = tx.insert_group("Newer", "PUBLIC", Utc::now()).await.unwrap();

        let first_join = Utc::now() - chrono::Duration::days(2);
        tx.insert_membership(user, older.id, PARTICIPANT, first_join)
            .await
            .unwrap();
        tx.insert_membership(user, newer.id, PARTICIPANT, Utc::now())
            .await
            .unwrap();

        let groups = tx.groups_of_user(user).await.unwrap();
        assert_eq!(
            groups.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
            vec!["Newer", "Older"]
        );
    }

    #[tokio::test]
    async fn deleting_a_group_cascades() {
        let store = MemStore::new();
        let mut tx = store.begin().await.unwrap();
        let group = tx.insert_group("Chess", "PRIVATE", Utc::now()).await.unwrap();
        let admin = Uuid::new_v4();
        tx.insert_membership(admin, group.id, ADMIN, Utc::now()).await.unwrap();
        tx.insert_request(Uuid::new_v4(), admin, group.id, "hi", Utc::now())
            .await
            .unwrap();

        assert!(tx.delete_group(group.id).await.unwrap());
        assert!(tx.admin_membership(group.id).await.unwrap().is_none());
        assert!(tx.requests_to(admin, RequestFilter::All).await.unwrap().is_empty());
    }
}
