//! Transactional persistence boundary. Every operation, reads included,
//! runs on a [`StoreTx`] handle so that event reactions land in the same
//! atomic unit as the write that triggered them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::group::Group;
use crate::membership::Membership;
use crate::request::MembershipRequest;

mod memory;
mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

/// Predicate over a user's inbound membership requests, one per cached
/// query kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFilter {
    All,
    Rejected,
    Unrejected,
    Viewed,
    Unviewed,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// One transaction against the backing store. Dropping the handle without
/// committing rolls every write back. Uniqueness invariants (group name,
/// (member, group) pair, one ADMIN per group, the request triple) are
/// enforced here, not just by caller-side existence checks.
#[async_trait]
pub trait StoreTx: Send {
    // Groups
    async fn insert_group(
        &mut self,
        name: &str,
        access: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Group>;
    async fn group_by_id(&mut self, group_id: Uuid) -> Result<Option<Group>>;
    async fn group_name_exists(&mut self, name: &str) -> Result<bool>;
    async fn delete_group(&mut self, group_id: Uuid) -> Result<bool>;
    /// Groups the user belongs to, most recently joined first; ties break
    /// on membership id ascending.
    async fn groups_of_user(&mut self, user_id: Uuid) -> Result<Vec<Group>>;

    // Memberships
    async fn insert_membership(
        &mut self,
        member_id: Uuid,
        group_id: Uuid,
        permit: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<Membership>;
    async fn membership_by_id(&mut self, membership_id: Uuid) -> Result<Option<Membership>>;
    async fn membership_exists(&mut self, member_id: Uuid, group_id: Uuid) -> Result<bool>;
    /// Indexed lookup of the group's ADMIN membership.
    async fn admin_membership(&mut self, group_id: Uuid) -> Result<Option<Membership>>;
    async fn memberships_of_group(&mut self, group_id: Uuid) -> Result<Vec<Membership>>;
    async fn delete_membership(&mut self, membership_id: Uuid) -> Result<bool>;
    async fn delete_group_memberships(&mut self, group_id: Uuid) -> Result<u64>;

    // Membership requests
    async fn insert_request(
        &mut self,
        from_user: Uuid,
        to_administrator: Uuid,
        group_id: Uuid,
        message: &str,
        created_at: DateTime<Utc>,
    ) -> Result<MembershipRequest>;
    async fn request_by_id(&mut self, request_id: Uuid) -> Result<Option<MembershipRequest>>;
    async fn request_exists(
        &mut self,
        from_user: Uuid,
        to_administrator: Uuid,
        group_id: Uuid,
    ) -> Result<bool>;
    async fn delete_request(&mut self, request_id: Uuid) -> Result<bool>;
    async fn set_request_rejected(
        &mut self,
        request_id: Uuid,
        rejected: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn set_request_viewed(
        &mut self,
        request_id: Uuid,
        viewed: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn requests_to(
        &mut self,
        to_administrator: Uuid,
        filter: RequestFilter,
    ) -> Result<Vec<MembershipRequest>>;
    async fn requests_from(&mut self, from_user: Uuid) -> Result<Vec<MembershipRequest>>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}
