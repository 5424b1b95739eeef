use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Membership permits. Each group holds exactly one ADMIN membership.
pub const ADMIN: &str = "ADMIN";
pub const PARTICIPANT: &str = "PART";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub member_id: Uuid,
    pub group_id: Uuid,
    pub permit: String, // "ADMIN" or "PART"
    pub joined_at: DateTime<Utc>,
}

/// Where the caller-facing layer should send the user after a join
/// attempt: straight to the group, or to the request-submission flow for
/// private groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTarget {
    GroupDetail(Uuid),
    MembershipRequestForm(Uuid),
}
