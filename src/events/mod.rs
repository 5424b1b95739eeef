//! Named-event dispatch connecting write operations to their reactions.
//!
//! Registration is explicit: the whole dispatch table is built in one
//! place ([`EventBus::standard`]), mapping an event kind to an ordered
//! list of reaction functions with typed return values. Emission is
//! synchronous and runs inside the emitting operation's transaction, so a
//! reaction's writes commit or roll back with the triggering write.

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::Result;
use crate::group::Group;
use crate::membership::Membership;
use crate::store::StoreTx;

mod reactions;

/// Events emitted by the stores. Payloads are owned so a reaction can run
/// against the emitting transaction without borrowing the caller's data.
#[derive(Debug, Clone)]
pub enum Event {
    GroupCreated { user: Uuid, group: Group },
    GroupAndMembershipsRemove { user: Option<Uuid>, group: Group },
    MembershipCreated { user: Uuid, group_id: Uuid },
    MembershipRequestSent { from_user: Uuid, group_id: Uuid },
    MembershipRequestAccepted { user: Uuid, request_id: Uuid },
    MembershipRequestRejected { user: Uuid, request_id: Uuid },
    MembershipRequestViewed { user: Uuid, request_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    GroupCreated,
    GroupAndMembershipsRemove,
    MembershipCreated,
    MembershipRequestSent,
    MembershipRequestAccepted,
    MembershipRequestRejected,
    MembershipRequestViewed,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::GroupCreated { .. } => EventKind::GroupCreated,
            Event::GroupAndMembershipsRemove { .. } => EventKind::GroupAndMembershipsRemove,
            Event::MembershipCreated { .. } => EventKind::MembershipCreated,
            Event::MembershipRequestSent { .. } => EventKind::MembershipRequestSent,
            Event::MembershipRequestAccepted { .. } => EventKind::MembershipRequestAccepted,
            Event::MembershipRequestRejected { .. } => EventKind::MembershipRequestRejected,
            Event::MembershipRequestViewed { .. } => EventKind::MembershipRequestViewed,
        }
    }
}

/// What a reaction hands back to the emitting operation.
#[derive(Debug)]
pub enum Outcome {
    Administrator(Membership),
    Removed(bool),
}

pub type Reaction = for<'a> fn(&'a mut dyn StoreTx, &'a Event) -> BoxFuture<'a, Result<Outcome>>;

/// Dispatch table from event kind to reactions, in registration order.
pub struct EventBus {
    table: Vec<(EventKind, Reaction)>,
}

impl EventBus {
    pub fn new(table: Vec<(EventKind, Reaction)>) -> Self {
        Self { table }
    }

    /// The standard wiring: creating a group assigns its creator as
    /// administrator, removing a group cascades over its memberships.
    pub fn standard() -> Self {
        Self::new(vec![
            (EventKind::GroupCreated, reactions::assign_creator_admin),
            (
                EventKind::GroupAndMembershipsRemove,
                reactions::remove_group_and_memberships,
            ),
        ])
    }

    /// Run every reaction registered for this event inside the caller's
    /// transaction, blocking until all complete. Outcomes come back in
    /// registration order; events without reactions yield an empty list.
    pub async fn emit(&self, tx: &mut dyn StoreTx, event: &Event) -> Result<Vec<Outcome>> {
        let kind = event.kind();
        tracing::debug!(?kind, "emitting event");
        let mut outcomes = Vec::new();
        for (registered, reaction) in &self.table {
            if *registered == kind {
                outcomes.push(reaction(tx, event).await?);
            }
        }
        Ok(outcomes)
    }
}
