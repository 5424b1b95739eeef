use group_manager::group::{PRIVATE, PUBLIC};
use group_manager::membership::PARTICIPANT;
use group_manager::request::DEFAULT_MESSAGE;
use group_manager::{AppError, AppState};
use uuid::Uuid;

fn state() -> AppState {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "group_manager=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
    AppState::in_memory()
}

#[tokio::test]
async fn request_is_addressed_to_the_current_administrator() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();

    let request = state
        .requests
        .send_membership_request(bob, group.id, Some("let me in"))
        .await
        .unwrap();
    assert_eq!(request.from_user, bob);
    assert_eq!(request.to_administrator, alice);
    assert_eq!(request.message, "let me in");
    assert!(request.rejected.is_none());
    assert!(request.viewed.is_none());

    assert_eq!(state.requests.requests_count(alice).await.unwrap(), 1);
    assert_eq!(state.requests.sent_requests_count(bob).await.unwrap(), 1);
}

#[tokio::test]
async fn omitted_message_falls_back_to_the_default() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();

    let request = state
        .requests
        .send_membership_request(bob, group.id, None)
        .await
        .unwrap();
    assert_eq!(request.message, DEFAULT_MESSAGE);
}

#[tokio::test]
async fn message_is_capped_at_150_characters() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();

    let long = "x".repeat(151);
    let err = state
        .requests
        .send_membership_request(bob, group.id, Some(&long))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn duplicate_requests_are_rejected_until_the_first_resolves() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();

    let request = state
        .requests
        .send_membership_request(bob, group.id, None)
        .await
        .unwrap();
    let err = state
        .requests
        .send_membership_request(bob, group.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateRequest));

    // Withdrawing clears the way for a new request.
    assert!(state.requests.remove_sent_request(Some(bob), request.id).await.unwrap());
    assert_eq!(state.requests.sent_requests_count(bob).await.unwrap(), 0);
    state
        .requests
        .send_membership_request(bob, group.id, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn requests_only_apply_to_private_groups() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Go", PUBLIC).await.unwrap();

    let err = state
        .requests
        .send_membership_request(bob, group.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAccessMode(_)));
}

#[tokio::test]
async fn members_cannot_request_to_join_again() {
    let state = state();
    let alice = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();

    let err = state
        .requests
        .send_membership_request(alice, group.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyMember));
}

#[tokio::test]
async fn accepting_converts_the_request_into_a_membership() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();
    let request = state
        .requests
        .send_membership_request(bob, group.id, Some("let me in"))
        .await
        .unwrap();

    let before = state.requests.requests_count(alice).await.unwrap();
    let membership = state
        .requests
        .accept_membership_request(Some(alice), request.id)
        .await
        .unwrap()
        .expect("administrator may accept");
    assert_eq!(membership.member_id, bob);
    assert_eq!(membership.permit, PARTICIPANT);

    // One request became exactly one membership.
    assert_eq!(state.requests.requests_count(alice).await.unwrap(), before - 1);
    assert_eq!(state.memberships.count_group_members(group.id).await.unwrap(), 2);
    assert!(state.memberships.is_member(Some(bob), group.id).await.unwrap());
}

#[tokio::test]
async fn acceptance_refreshes_the_requesters_group_list() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();

    // Warm bob's cached group list before the request resolves.
    assert!(state.groups.get_user_groups(bob).await.unwrap().is_empty());

    let request = state
        .requests
        .send_membership_request(bob, group.id, None)
        .await
        .unwrap();
    state
        .requests
        .accept_membership_request(Some(alice), request.id)
        .await
        .unwrap()
        .expect("administrator may accept");

    let groups = state.groups.get_user_groups(bob).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, group.id);
}

#[tokio::test]
async fn only_the_current_administrator_may_accept() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let mallory = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();
    let request = state
        .requests
        .send_membership_request(bob, group.id, None)
        .await
        .unwrap();

    assert!(state
        .requests
        .accept_membership_request(Some(mallory), request.id)
        .await
        .unwrap()
        .is_none());
    assert!(state
        .requests
        .accept_membership_request(Some(bob), request.id)
        .await
        .unwrap()
        .is_none());
    assert!(state
        .requests
        .accept_membership_request(None, request.id)
        .await
        .unwrap()
        .is_none());
    assert!(!state.memberships.is_member(Some(bob), group.id).await.unwrap());
}

#[tokio::test]
async fn rejection_is_idempotent() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();
    let request = state
        .requests
        .send_membership_request(bob, group.id, None)
        .await
        .unwrap();

    // Prime a sibling entry so the bust has something to invalidate.
    assert_eq!(state.requests.unrejected_requests_count(alice).await.unwrap(), 1);

    assert!(state
        .requests
        .reject_membership_request(Some(alice), request.id)
        .await
        .unwrap());
    assert_eq!(state.requests.rejected_requests_count(alice).await.unwrap(), 1);
    assert_eq!(state.requests.unrejected_requests_count(alice).await.unwrap(), 0);

    // A second rejection is a no-op.
    assert!(!state
        .requests
        .reject_membership_request(Some(alice), request.id)
        .await
        .unwrap());
    assert_eq!(state.requests.rejected_requests_count(alice).await.unwrap(), 1);
}

#[tokio::test]
async fn viewed_flag_toggles_and_is_idempotent() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();
    let request = state
        .requests
        .send_membership_request(bob, group.id, Some("let me in"))
        .await
        .unwrap();

    assert_eq!(state.requests.unviewed_requests_count(alice).await.unwrap(), 1);
    assert_eq!(state.requests.viewed_requests_count(alice).await.unwrap(), 0);

    // Only the administrator may mark.
    assert!(!state.requests.mark_viewed(Some(bob), request.id).await.unwrap());

    assert!(state.requests.mark_viewed(Some(alice), request.id).await.unwrap());
    assert_eq!(state.requests.viewed_requests_count(alice).await.unwrap(), 1);
    assert_eq!(state.requests.unviewed_requests_count(alice).await.unwrap(), 0);
    assert!(!state.requests.mark_viewed(Some(alice), request.id).await.unwrap());

    // Unmarking is the one reversible transition.
    assert!(state.requests.unmark_viewed(Some(alice), request.id).await.unwrap());
    assert_eq!(state.requests.unviewed_requests_count(alice).await.unwrap(), 1);
    assert!(!state.requests.unmark_viewed(Some(alice), request.id).await.unwrap());
}

#[tokio::test]
async fn administrator_can_remove_a_request_outright() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();
    let request = state
        .requests
        .send_membership_request(bob, group.id, None)
        .await
        .unwrap();

    assert!(!state
        .requests
        .remove_membership_request(Some(bob), request.id)
        .await
        .unwrap());
    assert!(state
        .requests
        .remove_membership_request(Some(alice), request.id)
        .await
        .unwrap());
    assert_eq!(state.requests.requests_count(alice).await.unwrap(), 0);
    assert!(!state.memberships.is_member(Some(bob), group.id).await.unwrap());
}

#[tokio::test]
async fn only_the_sender_may_withdraw_a_request() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let mallory = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();
    let request = state
        .requests
        .send_membership_request(bob, group.id, None)
        .await
        .unwrap();

    assert!(!state.requests.remove_sent_request(Some(mallory), request.id).await.unwrap());
    assert!(!state.requests.remove_sent_request(None, request.id).await.unwrap());
    assert!(state.requests.remove_sent_request(Some(bob), request.id).await.unwrap());
}

/// The full private-group walkthrough: request, view, accept.
#[tokio::test]
async fn private_group_join_walkthrough() {
    let state = state();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (group, _) = state.groups.create_group(alice, "Chess", PRIVATE).await.unwrap();

    let request = state
        .requests
        .send_membership_request(bob, group.id, Some("let me in"))
        .await
        .unwrap();
    let unviewed = state.requests.unviewed_requests(alice).await.unwrap();
    assert!(unviewed.iter().any(|r| r.id == request.id));

    assert!(state.requests.mark_viewed(Some(alice), request.id).await.unwrap());
    let viewed = state.requests.viewed_requests(alice).await.unwrap();
    assert!(viewed.iter().any(|r| r.id == request.id));
    assert!(state.requests.unviewed_requests(alice).await.unwrap().is_empty());

    state
        .requests
        .accept_membership_request(Some(alice), request.id)
        .await
        .unwrap()
        .expect("administrator may accept");
    assert!(state.memberships.is_member(Some(bob), group.id).await.unwrap());
    assert_eq!(state.memberships.count_group_members(group.id).await.unwrap(), 2);
    assert_eq!(state.groups.count_user_groups(bob).await.unwrap(), 1);
}
