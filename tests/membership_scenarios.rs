//! End-to-end membership flows against the in-memory store

mod common;

use std::sync::Arc;

use hyper::StatusCode;

use common::*;
use connected_community::db::schemas::{ResidentRole, ResidentState};
use connected_community::membership::JoinStatus;
use connected_community::store::{Store, UnitOfWork};
use connected_community::CommunityError;

async fn open_membership(
    store: &Arc<dyn Store>,
    user_id: bson::oid::ObjectId,
    street_group_id: bson::oid::ObjectId,
) -> bool {
    let mut uow = store.begin().await.unwrap();
    let membership = uow.current_membership(user_id, street_group_id).await.unwrap();
    uow.abort().await.unwrap();
    membership.is_some()
}

fn active_owners(records: &[connected_community::db::schemas::AddressResidentDoc]) -> usize {
    records.iter().filter(|r| r.is_active_owner()).count()
}

#[tokio::test]
async fn test_fresh_address_claim_makes_owner() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;

    let outcome = coordinator.join(alice.id, &high_street()).await.unwrap();
    assert_eq!(outcome.status, JoinStatus::Owner);
    assert_eq!(outcome.http_status(), StatusCode::CREATED);

    let address = fetch_address(&store, outcome.address_id).await;
    assert_eq!(address.resident_count, 1);
    assert_eq!(address.owner_user_id, Some(alice.id));
    assert_eq!(address.postcode, "KA12 8EE");

    let alice = fetch_user(&store, alice.id).await;
    assert_eq!(alice.address_id, Some(address.id));
    assert_eq!(alice.address_role, Some(ResidentRole::Owner));
    assert_eq!(alice.street_group_id, Some(address.street_group_id));
    assert_eq!(alice.town_id, Some(address.town_id));
    assert!(open_membership(&store, alice.id, address.street_group_id).await);

    let mut uow = store.begin().await.unwrap();
    let town = uow.town(address.town_id).await.unwrap().unwrap();
    let street = uow.street(address.street_group_id).await.unwrap().unwrap();
    uow.abort().await.unwrap();
    assert_eq!(town.name, "Irvine");
    assert_eq!(town.member_count, 1);
    assert_eq!(street.name, "High Street");
    assert_eq!(street.member_count, 1);
}

#[tokio::test]
async fn test_second_claimant_files_pending_request() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;

    let claimed = coordinator.join(alice.id, &high_street()).await.unwrap();
    let outcome = coordinator.join(bob.id, &high_street()).await.unwrap();

    assert_eq!(outcome.status, JoinStatus::Pending);
    assert_eq!(outcome.http_status(), StatusCode::ACCEPTED);
    assert_eq!(outcome.address_id, claimed.address_id);

    let address = fetch_address(&store, outcome.address_id).await;
    assert_eq!(address.resident_count, 1);

    let records = residents_at(&store, address.id).await;
    let request = records.iter().find(|r| r.user_id == bob.id).unwrap();
    assert_eq!(request.state, ResidentState::Pending);
    assert_eq!(request.role, ResidentRole::Resident);

    // Nothing is placed until the owner approves
    let bob = fetch_user(&store, bob.id).await;
    assert_eq!(bob.address_id, None);
    assert!(!open_membership(&store, bob.id, address.street_group_id).await);
}

#[tokio::test]
async fn test_repeat_join_is_idempotent() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let first = coordinator.join(bob.id, &high_street()).await.unwrap();
    let second = coordinator.join(bob.id, &high_street()).await.unwrap();

    assert_eq!(second.status, JoinStatus::Pending);
    assert_eq!(second.http_status(), StatusCode::ACCEPTED);
    assert_eq!(second.request_id, first.request_id);
    assert_eq!(second.message, "Request already submitted");

    let records = residents_at(&store, first.address_id).await;
    assert_eq!(records.iter().filter(|r| r.user_id == bob.id).count(), 1);

    // The owner re-joining gets their own record back
    let again = coordinator.join(alice.id, &high_street()).await.unwrap();
    assert_eq!(again.status, JoinStatus::Owner);
    assert_eq!(again.http_status(), StatusCode::OK);
    assert_eq!(residents_at(&store, first.address_id).await.len(), 2);
}

#[tokio::test]
async fn test_postcode_is_matched_case_insensitively() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;

    let claimed = coordinator.join(alice.id, &high_street()).await.unwrap();
    let request = join_request("1 High Street", "ka12 8ee", "Irvine", "High Street");
    let outcome = coordinator.join(bob.id, &request).await.unwrap();

    assert_eq!(outcome.address_id, claimed.address_id);
    assert_eq!(outcome.status, JoinStatus::Pending);
}

#[tokio::test]
async fn test_owner_approves_request() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let pending = coordinator.join(bob.id, &high_street()).await.unwrap();

    let message = coordinator
        .approve(alice.id, pending.address_id, pending.request_id)
        .await
        .unwrap();
    assert_eq!(message, "Resident approved");

    let address = fetch_address(&store, pending.address_id).await;
    assert_eq!(address.resident_count, 2);

    let records = residents_at(&store, address.id).await;
    let record = records.iter().find(|r| r.id == pending.request_id).unwrap();
    assert_eq!(record.state, ResidentState::Active);
    assert!(record.approved_at.is_some());

    let alice = fetch_user(&store, alice.id).await;
    let bob = fetch_user(&store, bob.id).await;
    assert_eq!(bob.address_id, Some(address.id));
    assert_eq!(bob.address_role, Some(ResidentRole::Resident));
    assert_eq!(bob.street_group_id, alice.street_group_id);
    assert_eq!(bob.town_id, alice.town_id);
    assert!(open_membership(&store, bob.id, address.street_group_id).await);
}

#[tokio::test]
async fn test_approval_uses_address_street() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;
    let admin = admin_user(&store).await;

    let claimed = coordinator.join(alice.id, &high_street()).await.unwrap();
    let pending = coordinator.join(bob.id, &high_street()).await.unwrap();

    // An admin placed nowhere approves; the requester still lands on the
    // address's own street and town
    coordinator
        .approve(admin.id, pending.address_id, pending.request_id)
        .await
        .unwrap();

    let address = fetch_address(&store, claimed.address_id).await;
    let bob = fetch_user(&store, bob.id).await;
    assert_eq!(bob.street_group_id, Some(address.street_group_id));
    assert_eq!(bob.town_id, Some(address.town_id));
}

#[tokio::test]
async fn test_deny_closes_request_without_side_effects() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let pending = coordinator.join(bob.id, &high_street()).await.unwrap();

    coordinator
        .deny(alice.id, pending.address_id, pending.request_id)
        .await
        .unwrap();

    let records = residents_at(&store, pending.address_id).await;
    let record = records.iter().find(|r| r.id == pending.request_id).unwrap();
    assert_eq!(record.state, ResidentState::Removed);
    assert!(record.removed_at.is_some());

    let address = fetch_address(&store, pending.address_id).await;
    assert_eq!(address.resident_count, 1);
    assert_eq!(fetch_user(&store, bob.id).await.address_id, None);

    // A denied user may ask again
    let retry = coordinator.join(bob.id, &high_street()).await.unwrap();
    assert_eq!(retry.status, JoinStatus::Pending);
    assert_ne!(retry.request_id, pending.request_id);
}

#[tokio::test]
async fn test_decisions_require_pending_request() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let pending = coordinator.join(bob.id, &high_street()).await.unwrap();
    coordinator
        .approve(alice.id, pending.address_id, pending.request_id)
        .await
        .unwrap();

    let again = coordinator
        .approve(alice.id, pending.address_id, pending.request_id)
        .await;
    assert!(matches!(again, Err(CommunityError::InvalidState(_))));

    let deny = coordinator
        .deny(alice.id, pending.address_id, pending.request_id)
        .await;
    assert!(matches!(deny, Err(CommunityError::InvalidState(_))));

    // No mutation from the failed calls
    assert_eq!(fetch_address(&store, pending.address_id).await.resident_count, 2);

    let unknown = coordinator
        .approve(alice.id, pending.address_id, bson::oid::ObjectId::new())
        .await;
    assert!(matches!(unknown, Err(CommunityError::NotFound(_))));
}

#[tokio::test]
async fn test_only_owner_or_admin_decides() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;
    let carol = verified_user(&store, "Carol").await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let pending = coordinator.join(bob.id, &high_street()).await.unwrap();

    let by_stranger = coordinator
        .approve(carol.id, pending.address_id, pending.request_id)
        .await;
    assert!(matches!(by_stranger, Err(CommunityError::Forbidden(_))));

    let by_requester = coordinator
        .approve(bob.id, pending.address_id, pending.request_id)
        .await;
    assert!(matches!(by_requester, Err(CommunityError::Forbidden(_))));

    let transfer = coordinator
        .transfer(carol.id, pending.address_id, carol.id)
        .await;
    assert!(matches!(transfer, Err(CommunityError::Forbidden(_))));

    let remove = coordinator.remove(carol.id, pending.address_id, alice.id).await;
    assert!(matches!(remove, Err(CommunityError::Forbidden(_))));
}

#[tokio::test]
async fn test_transfer_swaps_roles() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let pending = coordinator.join(bob.id, &high_street()).await.unwrap();
    coordinator
        .approve(alice.id, pending.address_id, pending.request_id)
        .await
        .unwrap();

    coordinator
        .transfer(alice.id, pending.address_id, bob.id)
        .await
        .unwrap();

    let records = residents_at(&store, pending.address_id).await;
    let alice_record = records.iter().find(|r| r.user_id == alice.id).unwrap();
    let bob_record = records.iter().find(|r| r.user_id == bob.id).unwrap();
    assert_eq!(alice_record.role, ResidentRole::Resident);
    assert_eq!(bob_record.role, ResidentRole::Owner);
    assert_eq!(active_owners(&records), 1);

    let address = fetch_address(&store, pending.address_id).await;
    assert_eq!(address.owner_user_id, Some(bob.id));
    assert_eq!(address.resident_count, 2);

    assert_eq!(
        fetch_user(&store, alice.id).await.address_role,
        Some(ResidentRole::Resident)
    );
    assert_eq!(
        fetch_user(&store, bob.id).await.address_role,
        Some(ResidentRole::Owner)
    );

    // The former owner can no longer manage the address
    let back = coordinator.transfer(alice.id, pending.address_id, alice.id).await;
    assert!(matches!(back, Err(CommunityError::Forbidden(_))));
}

#[tokio::test]
async fn test_transfer_requires_active_resident() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let pending = coordinator.join(bob.id, &high_street()).await.unwrap();

    let result = coordinator.transfer(alice.id, pending.address_id, bob.id).await;
    assert!(matches!(result, Err(CommunityError::InvalidState(_))));

    let address = fetch_address(&store, pending.address_id).await;
    assert_eq!(address.owner_user_id, Some(alice.id));
}

#[tokio::test]
async fn test_removal_leaves_vacancy_that_next_claim_fills() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;
    let carol = verified_user(&store, "Carol").await;
    let admin = admin_user(&store).await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let pending = coordinator.join(bob.id, &high_street()).await.unwrap();
    let address_id = pending.address_id;
    coordinator
        .approve(alice.id, address_id, pending.request_id)
        .await
        .unwrap();
    coordinator.transfer(alice.id, address_id, bob.id).await.unwrap();

    coordinator.remove(admin.id, address_id, bob.id).await.unwrap();

    let records = residents_at(&store, address_id).await;
    let bob_record = records.iter().find(|r| r.user_id == bob.id).unwrap();
    assert_eq!(bob_record.state, ResidentState::Removed);
    assert!(bob_record.removed_at.is_some());
    assert_eq!(active_owners(&records), 0);

    let address = fetch_address(&store, address_id).await;
    assert_eq!(address.resident_count, 1);
    assert_eq!(address.owner_user_id, None);

    let removed = fetch_user(&store, bob.id).await;
    assert_eq!(removed.address_id, None);
    assert_eq!(removed.address_role, None);
    assert_eq!(removed.street_group_id, None);
    assert_eq!(removed.town_id, None);
    assert!(!open_membership(&store, bob.id, address.street_group_id).await);

    // Vacancy: a newcomer becomes owner directly rather than waiting
    let outcome = coordinator.join(carol.id, &high_street()).await.unwrap();
    assert_eq!(outcome.status, JoinStatus::Owner);
    assert_eq!(outcome.http_status(), StatusCode::OK);
    assert_eq!(outcome.address_id, address_id);

    let address = fetch_address(&store, address_id).await;
    assert_eq!(address.owner_user_id, Some(carol.id));
    assert_eq!(address.resident_count, 2);
    assert_eq!(active_owners(&residents_at(&store, address_id).await), 1);
    assert_eq!(
        fetch_user(&store, carol.id).await.address_role,
        Some(ResidentRole::Owner)
    );
}

#[tokio::test]
async fn test_remaining_resident_reclaims_vacant_address() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let pending = coordinator.join(bob.id, &high_street()).await.unwrap();
    coordinator
        .approve(alice.id, pending.address_id, pending.request_id)
        .await
        .unwrap();

    // The owner leaves on their own
    coordinator
        .remove(alice.id, pending.address_id, alice.id)
        .await
        .unwrap();

    let outcome = coordinator.join(bob.id, &high_street()).await.unwrap();
    assert_eq!(outcome.status, JoinStatus::Owner);
    assert_eq!(outcome.request_id, pending.request_id);

    let address = fetch_address(&store, pending.address_id).await;
    assert_eq!(address.owner_user_id, Some(bob.id));
    assert_eq!(address.resident_count, 1);
    assert_eq!(
        fetch_user(&store, bob.id).await.address_role,
        Some(ResidentRole::Owner)
    );
}

#[tokio::test]
async fn test_remove_requires_active_record() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;

    let claimed = coordinator.join(alice.id, &high_street()).await.unwrap();
    coordinator.join(bob.id, &high_street()).await.unwrap();

    let result = coordinator.remove(alice.id, claimed.address_id, bob.id).await;
    assert!(matches!(result, Err(CommunityError::NotFound(_))));
}

#[tokio::test]
async fn test_one_active_residency_per_user() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let elsewhere = join_request("9 Bank Street", "KA12 0AA", "Irvine", "Bank Street");
    let result = coordinator.join(alice.id, &elsewhere).await;
    assert!(matches!(result, Err(CommunityError::InvalidState(_))));

    let mut uow = store.begin().await.unwrap();
    let address = uow.address_by_key("KA12 0AA", "9 Bank Street").await.unwrap();
    uow.abort().await.unwrap();
    assert!(address.is_none());
}

#[tokio::test]
async fn test_invalid_join_request_rejected() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;

    let request = join_request("1", "KA12 8EE", "Irvine", "High Street");
    let result = coordinator.join(alice.id, &request).await;
    assert!(matches!(result, Err(CommunityError::Validation(_))));
}

#[tokio::test]
async fn test_concurrent_first_claims_yield_one_owner() {
    let store = memory_store();
    let coordinator = Arc::new(coordinator(&store));

    let mut users = Vec::new();
    for name in ["Alice", "Bob", "Carol", "Dan", "Eve"] {
        users.push(verified_user(&store, name).await);
    }

    let handles: Vec<_> = users
        .iter()
        .map(|user| {
            let coordinator = Arc::clone(&coordinator);
            let user_id = user.id;
            tokio::spawn(async move { coordinator.join(user_id, &high_street()).await })
        })
        .collect();

    let mut owners = 0;
    let mut pending = 0;
    let mut address_ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        address_ids.push(outcome.address_id);
        match outcome.status {
            JoinStatus::Owner => owners += 1,
            JoinStatus::Pending => pending += 1,
            JoinStatus::Active => {}
        }
    }

    assert_eq!(owners, 1);
    assert_eq!(pending, 4);
    address_ids.dedup();
    assert_eq!(address_ids.len(), 1);

    let records = residents_at(&store, address_ids[0]).await;
    assert_eq!(active_owners(&records), 1);
    assert_eq!(fetch_address(&store, address_ids[0]).await.resident_count, 1);
}

#[tokio::test]
async fn test_address_role_mirrors_records() {
    let store = memory_store();
    let coordinator = coordinator(&store);
    let alice = verified_user(&store, "Alice").await;
    let bob = verified_user(&store, "Bob").await;
    let carol = verified_user(&store, "Carol").await;

    coordinator.join(alice.id, &high_street()).await.unwrap();
    let address_id = {
        let bob_request = coordinator.join(bob.id, &high_street()).await.unwrap();
        coordinator
            .approve(alice.id, bob_request.address_id, bob_request.request_id)
            .await
            .unwrap();
        bob_request.address_id
    };
    coordinator.join(carol.id, &high_street()).await.unwrap();
    coordinator.transfer(alice.id, address_id, bob.id).await.unwrap();
    coordinator.remove(bob.id, address_id, alice.id).await.unwrap();

    let records = residents_at(&store, address_id).await;
    for user in [&alice, &bob, &carol] {
        let user = fetch_user(&store, user.id).await;
        let expected = records
            .iter()
            .find(|r| r.user_id == user.id && r.state == ResidentState::Active)
            .map(|r| r.role);
        assert_eq!(user.address_role, expected, "role mirror for {}", user.first_name);
    }
}

/// Alice owns High Street and Bob has a pending request there.
/// Returns (coordinator, alice, bob, address id, bob's request id).
async fn owner_with_pending_request(
    store: &Arc<dyn Store>,
) -> (
    Arc<connected_community::membership::MembershipCoordinator>,
    connected_community::db::schemas::UserDoc,
    connected_community::db::schemas::UserDoc,
    bson::oid::ObjectId,
    bson::oid::ObjectId,
) {
    let coordinator = Arc::new(coordinator(store));
    let alice = verified_user(store, "Alice").await;
    let bob = verified_user(store, "Bob").await;

    let claimed = coordinator.join(alice.id, &high_street()).await.unwrap();
    coordinator.join(bob.id, &high_street()).await.unwrap();
    let request_id = residents_at(store, claimed.address_id)
        .await
        .iter()
        .find(|r| r.user_id == bob.id)
        .unwrap()
        .id;

    (coordinator, alice, bob, claimed.address_id, request_id)
}

async fn street_member_count(store: &Arc<dyn Store>, street_group_id: bson::oid::ObjectId) -> i64 {
    let mut uow = store.begin().await.unwrap();
    let street = uow.street(street_group_id).await.unwrap().unwrap();
    uow.abort().await.unwrap();
    street.member_count
}

#[tokio::test]
async fn test_concurrent_approve_and_deny_settle_once() {
    let store = memory_store();
    let (coordinator, alice, bob, address_id, request_id) =
        owner_with_pending_request(&store).await;
    let alice_id = alice.id;

    let approving = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.approve(alice_id, address_id, request_id).await })
    };
    let denying = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.deny(alice_id, address_id, request_id).await })
    };
    let approved = approving.await.unwrap();
    let denied = denying.await.unwrap();

    assert!(approved.is_ok() != denied.is_ok());
    let loser = if approved.is_ok() { &denied } else { &approved };
    assert!(matches!(loser, Err(CommunityError::InvalidState(_))));

    let address = fetch_address(&store, address_id).await;
    let record = residents_at(&store, address_id)
        .await
        .into_iter()
        .find(|r| r.id == request_id)
        .unwrap();
    let bob = fetch_user(&store, bob.id).await;
    let members = street_member_count(&store, address.street_group_id).await;

    if approved.is_ok() {
        assert_eq!(record.state, ResidentState::Active);
        assert_eq!(address.resident_count, 2);
        assert_eq!(bob.address_id, Some(address_id));
        assert!(open_membership(&store, bob.id, address.street_group_id).await);
        assert_eq!(members, 2);
    } else {
        assert_eq!(record.state, ResidentState::Removed);
        assert_eq!(address.resident_count, 1);
        assert_eq!(bob.address_id, None);
        assert!(!open_membership(&store, bob.id, address.street_group_id).await);
        assert_eq!(members, 1);
    }
}

#[tokio::test]
async fn test_concurrent_removals_apply_once() {
    let store = memory_store();
    let (coordinator, alice, bob, address_id, request_id) =
        owner_with_pending_request(&store).await;
    coordinator.approve(alice.id, address_id, request_id).await.unwrap();
    let (alice_id, bob_id) = (alice.id, bob.id);

    // Bob leaves while Alice removes him
    let by_owner = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.remove(alice_id, address_id, bob_id).await })
    };
    let by_self = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.remove(bob_id, address_id, bob_id).await })
    };
    let results = [by_owner.await.unwrap(), by_self.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(CommunityError::NotFound(_)))));

    let address = fetch_address(&store, address_id).await;
    assert_eq!(address.resident_count, 1);
    assert_eq!(address.owner_user_id, Some(alice.id));
    assert_eq!(street_member_count(&store, address.street_group_id).await, 1);

    let bob = fetch_user(&store, bob.id).await;
    assert_eq!(bob.address_id, None);
    assert!(!open_membership(&store, bob.id, address.street_group_id).await);
    assert!(open_membership(&store, alice.id, address.street_group_id).await);
}

#[tokio::test]
async fn test_approval_survives_a_conflicted_commit() {
    let memory = connected_community::store::MemoryStore::new();
    let store: Arc<dyn Store> = Arc::new(memory.clone());
    let (coordinator, alice, bob, address_id, request_id) =
        owner_with_pending_request(&store).await;

    memory.refuse_next_commits(1);
    let message = coordinator.approve(alice.id, address_id, request_id).await.unwrap();
    assert!(!message.is_empty());

    // Applied exactly once despite the rerun
    let address = fetch_address(&store, address_id).await;
    assert_eq!(address.resident_count, 2);
    assert_eq!(street_member_count(&store, address.street_group_id).await, 2);
    let bob = fetch_user(&store, bob.id).await;
    assert_eq!(bob.address_role, Some(ResidentRole::Resident));
    assert!(open_membership(&store, bob.id, address.street_group_id).await);
}
