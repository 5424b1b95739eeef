use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use super::request_models::{MembershipRequest, RequestMessage, DEFAULT_MESSAGE};
use crate::cache::keys::{cache_bust, make_key, CacheKind};
use crate::cache::{read_through, Cache};
use crate::error::{AppError, Result};
use crate::events::{Event, EventBus};
use crate::group::PRIVATE;
use crate::guard;
use crate::membership::{self, Membership, PARTICIPANT};
use crate::store::{RequestFilter, Store};

#[derive(Clone)]
pub struct RequestService {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    events: Arc<EventBus>,
}

impl RequestService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>, events: Arc<EventBus>) -> Self {
        Self { store, cache, events }
    }

    /// Ask to join a private group. The request is addressed to the
    /// group's current administrator, resolved at send time.
    pub async fn send_membership_request(
        &self,
        from_user: Uuid,
        group_id: Uuid,
        message: Option<&str>,
    ) -> Result<MembershipRequest> {
        let message = message.unwrap_or(DEFAULT_MESSAGE);
        RequestMessage { message: message.to_string() }.validate()?;

        let mut tx = self.store.begin().await?;
        let group = tx
            .group_by_id(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {group_id}")))?;
        if group.access != PRIVATE {
            return Err(AppError::InvalidAccessMode(group.access));
        }
        if tx.membership_exists(from_user, group_id).await? {
            return Err(AppError::AlreadyMember);
        }
        let to_administrator = membership::get_group_admin(&mut *tx, group_id)
            .await?
            .member_id;
        if tx.request_exists(from_user, to_administrator, group_id).await? {
            return Err(AppError::DuplicateRequest);
        }
        let request = tx
            .insert_request(from_user, to_administrator, group_id, message, Utc::now())
            .await?;
        self.events
            .emit(&mut *tx, &Event::MembershipRequestSent { from_user, group_id })
            .await?;
        tx.commit().await?;

        cache_bust(
            self.cache.as_ref(),
            &[
                (CacheKind::Requests, to_administrator),
                (CacheKind::SentRequests, from_user),
            ],
        )
        .await?;
        tracing::info!(%from_user, %group_id, request_id = %request.id, "membership request sent");
        Ok(request)
    }

    /// Accept a request, converting it into a participant membership and
    /// deleting the request. `None` when the actor fails the administrator
    /// guard or the requester already joined in the meantime.
    pub async fn accept_membership_request(
        &self,
        actor: Option<Uuid>,
        request_id: Uuid,
    ) -> Result<Option<Membership>> {
        let mut tx = self.store.begin().await?;
        let Some(request) = tx.request_by_id(request_id).await? else {
            return Ok(None);
        };
        if !guard::admin_permit(&mut *tx, actor, request.to_administrator, request.group_id)
            .await?
        {
            return Ok(None);
        }
        if tx.membership_exists(request.from_user, request.group_id).await? {
            return Ok(None);
        }

        let membership = tx
            .insert_membership(request.from_user, request.group_id, PARTICIPANT, Utc::now())
            .await?;
        tx.delete_request(request_id).await?;
        self.events
            .emit(
                &mut *tx,
                &Event::MembershipRequestAccepted { user: request.from_user, request_id },
            )
            .await?;
        tx.commit().await?;

        cache_bust(
            self.cache.as_ref(),
            &[
                (CacheKind::Requests, request.to_administrator),
                (CacheKind::Memberships, request.group_id),
                (CacheKind::Groups, request.from_user),
            ],
        )
        .await?;
        tracing::info!(%request_id, group_id = %request.group_id, "membership request accepted");
        Ok(Some(membership))
    }

    /// Reject a request. Idempotent: rejecting twice is a no-op with no
    /// event and no bust.
    pub async fn reject_membership_request(
        &self,
        actor: Option<Uuid>,
        request_id: Uuid,
    ) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let Some(request) = tx.request_by_id(request_id).await? else {
            return Ok(false);
        };
        if !guard::admin_permit(&mut *tx, actor, request.to_administrator, request.group_id)
            .await?
        {
            return Ok(false);
        }
        if request.rejected.is_some() {
            return Ok(false);
        }

        tx.set_request_rejected(request_id, Some(Utc::now())).await?;
        self.events
            .emit(
                &mut *tx,
                &Event::MembershipRequestRejected { user: request.from_user, request_id },
            )
            .await?;
        tx.commit().await?;

        cache_bust(
            self.cache.as_ref(),
            &[(CacheKind::Requests, request.to_administrator)],
        )
        .await?;
        tracing::info!(%request_id, "membership request rejected");
        Ok(true)
    }

    /// Drop a request from the administrator's inbox.
    pub async fn remove_membership_request(
        &self,
        actor: Option<Uuid>,
        request_id: Uuid,
    ) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let Some(request) = tx.request_by_id(request_id).await? else {
            return Ok(false);
        };
        if !guard::admin_permit(&mut *tx, actor, request.to_administrator, request.group_id)
            .await?
        {
            return Ok(false);
        }

        tx.delete_request(request_id).await?;
        tx.commit().await?;
        cache_bust(
            self.cache.as_ref(),
            &[(CacheKind::Requests, request.to_administrator)],
        )
        .await?;
        Ok(true)
    }

    /// The requester withdraws their own request.
    pub async fn remove_sent_request(
        &self,
        actor: Option<Uuid>,
        request_id: Uuid,
    ) -> Result<bool> {
        let Some(actor) = actor else {
            return Ok(false);
        };
        let mut tx = self.store.begin().await?;
        let Some(request) = tx.request_by_id(request_id).await? else {
            return Ok(false);
        };
        if actor != request.from_user {
            return Ok(false);
        }

        tx.delete_request(request_id).await?;
        tx.commit().await?;
        cache_bust(self.cache.as_ref(), &[(CacheKind::SentRequests, actor)]).await?;
        Ok(true)
    }

    /// Mark a request viewed the first time the administrator reads it.
    /// Returns `false` without an event or bust when already viewed.
    pub async fn mark_viewed(&self, actor: Option<Uuid>, request_id: Uuid) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let Some(request) = tx.request_by_id(request_id).await? else {
            return Ok(false);
        };
        if !guard::admin_permit(&mut *tx, actor, request.to_administrator, request.group_id)
            .await?
        {
            return Ok(false);
        }
        if request.viewed.is_some() {
            return Ok(false);
        }

        tx.set_request_viewed(request_id, Some(Utc::now())).await?;
        self.events
            .emit(
                &mut *tx,
                &Event::MembershipRequestViewed { user: request.from_user, request_id },
            )
            .await?;
        tx.commit().await?;
        cache_bust(
            self.cache.as_ref(),
            &[(CacheKind::Requests, request.to_administrator)],
        )
        .await?;
        Ok(true)
    }

    /// Clear the viewed flag, the one reversible transition.
    pub async fn unmark_viewed(&self, actor: Option<Uuid>, request_id: Uuid) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let Some(request) = tx.request_by_id(request_id).await? else {
            return Ok(false);
        };
        if !guard::admin_permit(&mut *tx, actor, request.to_administrator, request.group_id)
            .await?
        {
            return Ok(false);
        }
        if request.viewed.is_none() {
            return Ok(false);
        }

        tx.set_request_viewed(request_id, None).await?;
        tx.commit().await?;
        cache_bust(
            self.cache.as_ref(),
            &[(CacheKind::Requests, request.to_administrator)],
        )
        .await?;
        Ok(true)
    }

    /// All requests addressed to `user` as group administrator.
    pub async fn requests(&self, user: Uuid) -> Result<Vec<MembershipRequest>> {
        self.cached_requests(user, CacheKind::Requests, RequestFilter::All)
            .await
    }

    pub async fn requests_count(&self, user: Uuid) -> Result<usize> {
        Ok(self.requests(user).await?.len())
    }

    pub async fn rejected_requests(&self, user: Uuid) -> Result<Vec<MembershipRequest>> {
        self.cached_requests(user, CacheKind::RejectedRequests, RequestFilter::Rejected)
            .await
    }

    pub async fn rejected_requests_count(&self, user: Uuid) -> Result<usize> {
        Ok(self.rejected_requests(user).await?.len())
    }

    pub async fn unrejected_requests(&self, user: Uuid) -> Result<Vec<MembershipRequest>> {
        self.cached_requests(user, CacheKind::UnrejectedRequests, RequestFilter::Unrejected)
            .await
    }

    pub async fn unrejected_requests_count(&self, user: Uuid) -> Result<usize> {
        Ok(self.unrejected_requests(user).await?.len())
    }

    pub async fn viewed_requests(&self, user: Uuid) -> Result<Vec<MembershipRequest>> {
        self.cached_requests(user, CacheKind::ViewedRequests, RequestFilter::Viewed)
            .await
    }

    pub async fn viewed_requests_count(&self, user: Uuid) -> Result<usize> {
        Ok(self.viewed_requests(user).await?.len())
    }

    pub async fn unviewed_requests(&self, user: Uuid) -> Result<Vec<MembershipRequest>> {
        self.cached_requests(user, CacheKind::UnviewedRequests, RequestFilter::Unviewed)
            .await
    }

    pub async fn unviewed_requests_count(&self, user: Uuid) -> Result<usize> {
        Ok(self.unviewed_requests(user).await?.len())
    }

    /// Requests the user has sent, across all groups.
    pub async fn sent_requests(&self, user: Uuid) -> Result<Vec<MembershipRequest>> {
        let key = make_key(CacheKind::SentRequests, user);
        let store = self.store.clone();
        read_through(self.cache.as_ref(), &key, move || async move {
            let mut tx = store.begin().await?;
            let requests = tx.requests_from(user).await?;
            tx.rollback().await?;
            Ok(requests)
        })
        .await
    }

    pub async fn sent_requests_count(&self, user: Uuid) -> Result<usize> {
        Ok(self.sent_requests(user).await?.len())
    }

    async fn cached_requests(
        &self,
        user: Uuid,
        kind: CacheKind,
        filter: RequestFilter,
    ) -> Result<Vec<MembershipRequest>> {
        let key = make_key(kind, user);
        let store = self.store.clone();
        read_through(self.cache.as_ref(), &key, move || async move {
            let mut tx = store.begin().await?;
            let requests = tx.requests_to(user, filter).await?;
            tx.rollback().await?;
            Ok(requests)
        })
        .await
    }
}
