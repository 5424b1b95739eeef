use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{RequestFilter, Store, StoreTx};
use crate::error::{AppError, Result};
use crate::group::Group;
use crate::membership::Membership;
use crate::request::MembershipRequest;

/// Postgres backend. Uniqueness invariants live in the schema (see
/// `migrations/`), so racing writers lose with the corresponding
/// duplicate error instead of corrupting state.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| AppError::Internal(format!("migration failed: {err}")))?;
        Ok(Self::with_pool(pool))
    }

    /// Wrap an existing pool, e.g. one whose migrations ran elsewhere.
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

/// The violated unique constraint's name, when the error is one.
fn unique_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
        {
            db.constraint().map(str::to_string)
        }
        _ => None,
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_group(
        &mut self,
        name: &str,
        access: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Group> {
        sqlx::query_as::<_, Group>(
            "INSERT INTO groups (id, name, access, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(access)
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| match unique_constraint(&err).as_deref() {
            Some("groups_name_key") => AppError::DuplicateName(name.to_string()),
            _ => err.into(),
        })
    }

    async fn group_by_id(&mut self, group_id: Uuid) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(group_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(group)
    }

    async fn group_name_exists(&mut self, name: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM groups WHERE name = $1)")
                .bind(name)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn delete_group(&mut self, group_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn groups_of_user(&mut self, user_id: Uuid) -> Result<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(
            "SELECT g.* FROM groups g
             INNER JOIN group_memberships gm ON g.id = gm.group_id
             WHERE gm.member_id = $1
             ORDER BY gm.joined_at DESC, gm.id ASC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(groups)
    }

    async fn insert_membership(
        &mut self,
        member_id: Uuid,
        group_id: Uuid,
        permit: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<Membership> {
        sqlx::query_as::<_, Membership>(
            "INSERT INTO group_memberships (id, member_id, group_id, permit, joined_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(group_id)
        .bind(permit)
        .bind(joined_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| match unique_constraint(&err).as_deref() {
            Some("group_memberships_member_id_group_id_key") => AppError::AlreadyMember,
            Some("group_memberships_single_admin") => {
                AppError::DuplicateAdministrator(group_id)
            }
            _ => err.into(),
        })
    }

    async fn membership_by_id(&mut self, membership_id: Uuid) -> Result<Option<Membership>> {
        let membership =
            sqlx::query_as::<_, Membership>("SELECT * FROM group_memberships WHERE id = $1")
                .bind(membership_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(membership)
    }

    async fn membership_exists(&mut self, member_id: Uuid, group_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM group_memberships WHERE member_id = $1 AND group_id = $2
             )",
        )
        .bind(member_id)
        .bind(group_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn admin_membership(&mut self, group_id: Uuid) -> Result<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            "SELECT * FROM group_memberships WHERE group_id = $1 AND permit = 'ADMIN'",
        )
        .bind(group_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(membership)
    }

    async fn memberships_of_group(&mut self, group_id: Uuid) -> Result<Vec<Membership>> {
        let memberships = sqlx::query_as::<_, Membership>(
            "SELECT * FROM group_memberships
             WHERE group_id = $1
             ORDER BY joined_at ASC, id ASC",
        )
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(memberships)
    }

    async fn delete_membership(&mut self, membership_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM group_memberships WHERE id = $1")
            .bind(membership_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_group_memberships(&mut self, group_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM group_memberships WHERE group_id = $1")
            .bind(group_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_request(
        &mut self,
        from_user: Uuid,
        to_administrator: Uuid,
        group_id: Uuid,
        message: &str,
        created_at: DateTime<Utc>,
    ) -> Result<MembershipRequest> {
        sqlx::query_as::<_, MembershipRequest>(
            "INSERT INTO membership_requests
                 (id, from_user, to_administrator, group_id, message, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(from_user)
        .bind(to_administrator)
        .bind(group_id)
        .bind(message)
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| match unique_constraint(&err).as_deref() {
            Some("membership_requests_triple_key") => AppError::DuplicateRequest,
            _ => err.into(),
        })
    }

    async fn request_by_id(&mut self, request_id: Uuid) -> Result<Option<MembershipRequest>> {
        let request = sqlx::query_as::<_, MembershipRequest>(
            "SELECT * FROM membership_requests WHERE id = $1",
        )
        .bind(request_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(request)
    }

    async fn request_exists(
        &mut self,
        from_user: Uuid,
        to_administrator: Uuid,
        group_id: Uuid,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM membership_requests
                 WHERE from_user = $1 AND to_administrator = $2 AND group_id = $3
             )",
        )
        .bind(from_user)
        .bind(to_administrator)
        .bind(group_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn delete_request(&mut self, request_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM membership_requests WHERE id = $1")
            .bind(request_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_request_rejected(
        &mut self,
        request_id: Uuid,
        rejected: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE membership_requests SET rejected = $1 WHERE id = $2")
            .bind(rejected)
            .bind(request_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_request_viewed(
        &mut self,
        request_id: Uuid,
        viewed: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE membership_requests SET viewed = $1 WHERE id = $2")
            .bind(viewed)
            .bind(request_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn requests_to(
        &mut self,
        to_administrator: Uuid,
        filter: RequestFilter,
    ) -> Result<Vec<MembershipRequest>> {
        let predicate = match filter {
            RequestFilter::All => "",
            RequestFilter::Rejected => " AND rejected IS NOT NULL",
            RequestFilter::Unrejected => " AND rejected IS NULL",
            RequestFilter::Viewed => " AND viewed IS NOT NULL",
            RequestFilter::Unviewed => " AND viewed IS NULL",
        };
        let sql = format!(
            "SELECT * FROM membership_requests
             WHERE to_administrator = $1{predicate}
             ORDER BY created_at ASC, id ASC"
        );
        let requests = sqlx::query_as::<_, MembershipRequest>(&sql)
            .bind(to_administrator)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(requests)
    }

    async fn requests_from(&mut self, from_user: Uuid) -> Result<Vec<MembershipRequest>> {
        let requests = sqlx::query_as::<_, MembershipRequest>(
            "SELECT * FROM membership_requests
             WHERE from_user = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(from_user)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(requests)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
