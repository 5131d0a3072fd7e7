//! Residency ledger
//!
//! Queries over address resident records used by the coordinator. The
//! "one open claim per user per address" rule is enforced here by
//! lookup-before-insert; the one-active-owner rule is also backed by a
//! storage constraint.

use bson::oid::ObjectId;

use crate::db::schemas::{AddressResidentDoc, ResidentRole, ResidentState};
use crate::store::{not_found, ResidentQuery, UnitOfWork};
use crate::types::{CommunityError, Result};

const OPEN_STATES: [ResidentState; 2] = [ResidentState::Pending, ResidentState::Active];

/// Every `ACTIVE` `OWNER` record on an address. Normally zero or one.
pub async fn active_owners(
    uow: &mut dyn UnitOfWork,
    address_id: ObjectId,
) -> Result<Vec<AddressResidentDoc>> {
    uow.residents(
        &ResidentQuery::at(address_id)
            .states(&[ResidentState::Active])
            .role(ResidentRole::Owner),
    )
    .await
}

/// The user's `PENDING` or `ACTIVE` record on an address
pub async fn open_claim(
    uow: &mut dyn UnitOfWork,
    address_id: ObjectId,
    user_id: ObjectId,
) -> Result<Option<AddressResidentDoc>> {
    let mut claims = uow
        .residents(&ResidentQuery::at(address_id).user(user_id).states(&OPEN_STATES))
        .await?;
    // Prefer the active record if both somehow exist
    claims.sort_by_key(|c| c.state != ResidentState::Active);
    Ok(claims.into_iter().next())
}

/// The user's `ACTIVE` record on an address
pub async fn active_record(
    uow: &mut dyn UnitOfWork,
    address_id: ObjectId,
    user_id: ObjectId,
) -> Result<Option<AddressResidentDoc>> {
    Ok(uow
        .residents(
            &ResidentQuery::at(address_id)
                .user(user_id)
                .states(&[ResidentState::Active]),
        )
        .await?
        .into_iter()
        .next())
}

pub async fn is_active_owner(
    uow: &mut dyn UnitOfWork,
    address_id: ObjectId,
    user_id: ObjectId,
) -> Result<bool> {
    Ok(active_record(uow, address_id, user_id)
        .await?
        .is_some_and(|r| r.role == ResidentRole::Owner))
}

/// A user lives at one address at a time. `address_id` is the address being
/// joined, `None` for one that does not exist yet.
pub async fn ensure_not_active_elsewhere(
    uow: &mut dyn UnitOfWork,
    user_id: ObjectId,
    address_id: Option<ObjectId>,
) -> Result<()> {
    let elsewhere = uow
        .residents(&ResidentQuery::held_by(user_id).states(&[ResidentState::Active]))
        .await?
        .into_iter()
        .any(|r| Some(r.address_id) != address_id);

    if elsewhere {
        return Err(CommunityError::InvalidState(
            "User is already an active resident of another address".into(),
        ));
    }
    Ok(())
}

/// Load a request on an address that is still awaiting a decision
pub async fn pending_request(
    uow: &mut dyn UnitOfWork,
    address_id: ObjectId,
    request_id: ObjectId,
) -> Result<AddressResidentDoc> {
    let request = uow
        .resident(request_id)
        .await?
        .filter(|r| r.address_id == address_id)
        .ok_or_else(|| not_found("Request"))?;

    if request.state != ResidentState::Pending {
        return Err(CommunityError::InvalidState(
            "Request already processed".into(),
        ));
    }
    Ok(request)
}
