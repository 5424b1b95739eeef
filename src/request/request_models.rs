use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use validator::Validate;

/// Message attached to a request when the sender writes none.
pub const DEFAULT_MESSAGE: &str = "I would like to join the group.";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MembershipRequest {
    pub id: Uuid,
    pub from_user: Uuid,
    /// Denormalized at send time; the guard re-resolves the current
    /// administrator on every administrator-only operation.
    pub to_administrator: Uuid,
    pub group_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub rejected: Option<DateTime<Utc>>,
    pub viewed: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RequestMessage {
    #[validate(length(max = 150, message = "Insert text up to 150 characters."))]
    pub message: String,
}
