//! Membership coordinator
//!
//! Orchestrates the address registry, residency ledger and street directory on
//! every claim, approval, denial, removal and ownership transfer, and keeps the
//! four placement pointers on the user record in step with them.
//!
//! Each operation runs in a single unit of work. A unit that conflicts with a
//! concurrent writer (duplicate key, transaction write conflict) is thrown away
//! and the whole operation is re-run against fresh state, so the checks below
//! always see what they are about to change.
//!
//! ## Operations
//!
//! - [`MembershipCoordinator::join`] - claim an address or request residency
//! - [`MembershipCoordinator::approve`] / [`MembershipCoordinator::deny`] - decide a request
//! - [`MembershipCoordinator::remove`] - end an active residency
//! - [`MembershipCoordinator::transfer`] - hand ownership to another active resident

pub mod address;
pub mod directory;
pub mod residency;

use bson::oid::ObjectId;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{
    AddressDoc, AddressResidentDoc, NewAddress, ResidentRole, ResidentState, UserDoc,
};
use crate::logging::{AuditEvent, AuditKind, AuditLogger};
use crate::store::{not_found, with_retry, Store, UnitOfWork};
use crate::types::{CommunityError, Result};

/// Body of a join-or-claim request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub postcode: String,
    pub town: String,
    pub street_name: String,
}

impl JoinRequest {
    pub fn validate(&self) -> Result<()> {
        let postcode = self.postcode.trim();
        if self.line1.trim().chars().count() < 3 {
            return Err(CommunityError::Validation(
                "line1 must be at least 3 characters".into(),
            ));
        }
        if !(5..=8).contains(&postcode.chars().count()) {
            return Err(CommunityError::Validation(
                "postcode must be 5 to 8 characters".into(),
            ));
        }
        if self.town.trim().chars().count() < 2 {
            return Err(CommunityError::Validation(
                "town must be at least 2 characters".into(),
            ));
        }
        if self.street_name.trim().chars().count() < 2 {
            return Err(CommunityError::Validation(
                "streetName must be at least 2 characters".into(),
            ));
        }
        Ok(())
    }
}

/// Where the caller stands after a join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinStatus {
    /// Caller is the active owner
    Owner,
    /// Caller's request awaits the owner
    Pending,
    /// Caller is an active resident
    Active,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub status: JoinStatus,
    pub message: &'static str,
    pub address_id: ObjectId,
    /// The caller's resident record
    pub request_id: ObjectId,
    /// The address did not exist before this call
    pub created_address: bool,
}

impl JoinOutcome {
    pub fn http_status(&self) -> StatusCode {
        if self.created_address {
            StatusCode::CREATED
        } else if self.status == JoinStatus::Pending {
            StatusCode::ACCEPTED
        } else {
            StatusCode::OK
        }
    }
}

/// Sole writer of addresses, resident records, memberships and user placement
#[derive(Clone)]
pub struct MembershipCoordinator {
    store: Arc<dyn Store>,
    audit: AuditLogger,
}

impl MembershipCoordinator {
    pub fn new(store: Arc<dyn Store>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    /// Claim an address or ask to join it.
    ///
    /// A new address makes the caller its owner (`201`). An address with no
    /// active owner promotes the caller straight to owner (`200`). Otherwise a
    /// pending resident request is filed (`202`), or the caller's existing
    /// open claim is returned unchanged.
    pub async fn join(&self, user_id: ObjectId, request: &JoinRequest) -> Result<JoinOutcome> {
        request.validate()?;

        let (outcome, event) = with_retry!(self.store, "join", |uow| Self::join_in(
            uow, user_id, request
        ))?;

        info!(
            "User {} joined address {}: {:?}",
            user_id, outcome.address_id, outcome.status
        );
        if let Some(event) = event {
            self.audit.record(event).await;
        }
        Ok(outcome)
    }

    /// Accept a pending resident request
    pub async fn approve(
        &self,
        actor_id: ObjectId,
        address_id: ObjectId,
        request_id: ObjectId,
    ) -> Result<&'static str> {
        let event = with_retry!(self.store, "approve", |uow| Self::approve_in(
            uow, actor_id, address_id, request_id
        ))?;

        info!("Request {} on address {} approved by {}", request_id, address_id, actor_id);
        self.audit.record(event).await;
        Ok("Resident approved")
    }

    /// Reject a pending resident request
    pub async fn deny(
        &self,
        actor_id: ObjectId,
        address_id: ObjectId,
        request_id: ObjectId,
    ) -> Result<&'static str> {
        let event = with_retry!(self.store, "deny", |uow| Self::deny_in(
            uow, actor_id, address_id, request_id
        ))?;

        info!("Request {} on address {} denied by {}", request_id, address_id, actor_id);
        self.audit.record(event).await;
        Ok("Request denied")
    }

    /// End a user's active residency
    pub async fn remove(
        &self,
        actor_id: ObjectId,
        address_id: ObjectId,
        target_id: ObjectId,
    ) -> Result<&'static str> {
        let event = with_retry!(self.store, "remove", |uow| Self::remove_in(
            uow, actor_id, address_id, target_id
        ))?;

        info!("User {} removed from address {} by {}", target_id, address_id, actor_id);
        self.audit.record(event).await;
        Ok("Resident removed")
    }

    /// Make another active resident the owner
    pub async fn transfer(
        &self,
        actor_id: ObjectId,
        address_id: ObjectId,
        new_owner_id: ObjectId,
    ) -> Result<&'static str> {
        let event = with_retry!(self.store, "transfer", |uow| Self::transfer_in(
            uow,
            actor_id,
            address_id,
            new_owner_id
        ))?;

        info!(
            "Ownership of address {} transferred to {} by {}",
            address_id, new_owner_id, actor_id
        );
        self.audit.record(event).await;
        Ok("Ownership transferred")
    }

    async fn join_in(
        uow: &mut dyn UnitOfWork,
        user_id: ObjectId,
        request: &JoinRequest,
    ) -> Result<(JoinOutcome, Option<AuditEvent>)> {
        let user = load_user(uow, user_id).await?;
        let town = directory::resolve_town(uow, request.town.trim()).await?;
        let street = directory::resolve_street(uow, town.id, request.street_name.trim()).await?;

        let existing = address::find_by_key(uow, &request.postcode, &request.line1).await?;
        let Some(mut address) = existing else {
            residency::ensure_not_active_elsewhere(uow, user.id, None).await?;

            let line2 = request.line2.as_deref().map(str::trim).filter(|l| !l.is_empty());
            let address = address::register_owned(
                uow,
                NewAddress {
                    line1: request.line1.trim(),
                    line2,
                    town: request.town.trim(),
                    postcode: &request.postcode,
                    street_group_id: street.id,
                    town_id: town.id,
                },
                user.id,
            )
            .await?;

            let record = AddressResidentDoc::active_owner(address.id, user.id);
            uow.insert_resident(&record).await?;
            place_user(uow, user, &address, ResidentRole::Owner).await?;

            let event = AuditEvent::new(AuditKind::OwnershipClaimed, user_id, user_id, address.id)
                .with_request(record.id);
            return Ok((
                JoinOutcome {
                    status: JoinStatus::Owner,
                    message: "You are now the owner of this address",
                    address_id: address.id,
                    request_id: record.id,
                    created_address: true,
                },
                Some(event),
            ));
        };

        let owners = residency::active_owners(uow, address.id).await?;
        let claim = residency::open_claim(uow, address.id, user.id).await?;

        if owners.is_empty() {
            // Vacancy: the caller takes ownership directly
            let record = match claim {
                Some(mut record) if record.state == ResidentState::Active => {
                    record.role = ResidentRole::Owner;
                    uow.save_resident(&record).await?;

                    address.owner_user_id = Some(user.id);
                    uow.save_address(&address).await?;

                    let mut user = user;
                    user.address_role = Some(ResidentRole::Owner);
                    uow.save_user(&user).await?;
                    record
                }
                claim => {
                    residency::ensure_not_active_elsewhere(uow, user.id, Some(address.id)).await?;

                    let record = match claim {
                        Some(mut pending) => {
                            pending.role = ResidentRole::Owner;
                            pending.activate();
                            uow.save_resident(&pending).await?;
                            pending
                        }
                        None => {
                            let record = AddressResidentDoc::active_owner(address.id, user.id);
                            uow.insert_resident(&record).await?;
                            record
                        }
                    };

                    address.owner_user_id = Some(user.id);
                    address::adjust_resident_count(&mut address, 1);
                    uow.save_address(&address).await?;
                    place_user(uow, user, &address, ResidentRole::Owner).await?;
                    record
                }
            };

            let event = AuditEvent::new(AuditKind::OwnershipClaimed, user_id, user_id, address.id)
                .with_request(record.id);
            return Ok((
                JoinOutcome {
                    status: JoinStatus::Owner,
                    message: "Ownership confirmed",
                    address_id: address.id,
                    request_id: record.id,
                    created_address: false,
                },
                Some(event),
            ));
        }

        if let Some(record) = claim {
            let status = match (record.state, record.role) {
                (ResidentState::Pending, _) => JoinStatus::Pending,
                (_, ResidentRole::Owner) => JoinStatus::Owner,
                _ => JoinStatus::Active,
            };
            return Ok((
                JoinOutcome {
                    status,
                    message: "Request already submitted",
                    address_id: address.id,
                    request_id: record.id,
                    created_address: false,
                },
                None,
            ));
        }

        residency::ensure_not_active_elsewhere(uow, user.id, Some(address.id)).await?;
        let request = AddressResidentDoc::pending(address.id, user.id);
        uow.insert_resident(&request).await?;

        let event = AuditEvent::new(AuditKind::ResidentRequested, user_id, user_id, address.id)
            .with_request(request.id);
        Ok((
            JoinOutcome {
                status: JoinStatus::Pending,
                message: "Waiting for owner approval",
                address_id: address.id,
                request_id: request.id,
                created_address: false,
            },
            Some(event),
        ))
    }

    async fn approve_in(
        uow: &mut dyn UnitOfWork,
        actor_id: ObjectId,
        address_id: ObjectId,
        request_id: ObjectId,
    ) -> Result<AuditEvent> {
        let actor = load_user(uow, actor_id).await?;
        let mut address = address::load(uow, address_id).await?;
        authorize_manager(uow, &actor, address.id, "Only owners or admins can approve").await?;

        let mut request = residency::pending_request(uow, address.id, request_id).await?;
        let requester = uow
            .user(request.user_id)
            .await?
            .ok_or_else(|| not_found("User"))?;
        residency::ensure_not_active_elsewhere(uow, requester.id, Some(address.id)).await?;

        request.activate();
        uow.save_resident(&request).await?;

        address::adjust_resident_count(&mut address, 1);
        uow.save_address(&address).await?;

        let subject = requester.id;
        place_user(uow, requester, &address, request.role).await?;

        Ok(AuditEvent::new(AuditKind::ResidentApproved, actor_id, subject, address.id)
            .with_request(request.id))
    }

    async fn deny_in(
        uow: &mut dyn UnitOfWork,
        actor_id: ObjectId,
        address_id: ObjectId,
        request_id: ObjectId,
    ) -> Result<AuditEvent> {
        let actor = load_user(uow, actor_id).await?;
        let address = address::load(uow, address_id).await?;
        authorize_manager(uow, &actor, address.id, "Only owners or admins can deny").await?;

        let mut request = residency::pending_request(uow, address.id, request_id).await?;
        request.remove();
        uow.save_resident(&request).await?;

        Ok(
            AuditEvent::new(AuditKind::ResidentDenied, actor_id, request.user_id, address.id)
                .with_request(request.id),
        )
    }

    async fn remove_in(
        uow: &mut dyn UnitOfWork,
        actor_id: ObjectId,
        address_id: ObjectId,
        target_id: ObjectId,
    ) -> Result<AuditEvent> {
        let actor = load_user(uow, actor_id).await?;
        let mut address = address::load(uow, address_id).await?;

        let allowed = actor.is_admin
            || actor.id == target_id
            || residency::is_active_owner(uow, address.id, actor.id).await?;
        if !allowed {
            return Err(CommunityError::Forbidden(
                "Only owners or admins can remove residents".into(),
            ));
        }

        let mut record = residency::active_record(uow, address.id, target_id)
            .await?
            .ok_or_else(|| not_found("Resident"))?;
        record.remove();
        uow.save_resident(&record).await?;

        // Ownership is not reassigned; the address is left vacant
        address::adjust_resident_count(&mut address, -1);
        if record.role == ResidentRole::Owner && address.owner_user_id == Some(target_id) {
            address.owner_user_id = None;
        }
        uow.save_address(&address).await?;

        if let Some(mut target) = uow.user(target_id).await? {
            let street_group_id = target.street_group_id.unwrap_or(address.street_group_id);
            let town_id = target.town_id.or(Some(address.town_id));
            directory::leave_street(uow, target.id, street_group_id, town_id).await?;

            target.unplace();
            uow.save_user(&target).await?;
        }

        Ok(
            AuditEvent::new(AuditKind::ResidentRemoved, actor_id, target_id, address.id)
                .with_request(record.id),
        )
    }

    async fn transfer_in(
        uow: &mut dyn UnitOfWork,
        actor_id: ObjectId,
        address_id: ObjectId,
        new_owner_id: ObjectId,
    ) -> Result<AuditEvent> {
        let actor = load_user(uow, actor_id).await?;
        let mut address = address::load(uow, address_id).await?;
        authorize_manager(
            uow,
            &actor,
            address.id,
            "Only owners or admins can transfer ownership",
        )
        .await?;

        let mut target = residency::active_record(uow, address.id, new_owner_id)
            .await?
            .ok_or_else(|| {
                CommunityError::InvalidState("New owner must be an active resident".into())
            })?;

        // Demote every current owner, not just one
        for mut owner in residency::active_owners(uow, address.id).await? {
            if owner.user_id == new_owner_id {
                continue;
            }
            owner.role = ResidentRole::Resident;
            uow.save_resident(&owner).await?;

            if let Some(mut demoted) = uow.user(owner.user_id).await? {
                demoted.address_role = Some(ResidentRole::Resident);
                uow.save_user(&demoted).await?;
            }
        }

        target.role = ResidentRole::Owner;
        uow.save_resident(&target).await?;

        address.owner_user_id = Some(new_owner_id);
        uow.save_address(&address).await?;

        let mut new_owner = load_user(uow, new_owner_id).await?;
        new_owner.address_role = Some(ResidentRole::Owner);
        uow.save_user(&new_owner).await?;

        Ok(
            AuditEvent::new(AuditKind::OwnershipTransferred, actor_id, new_owner_id, address.id)
                .with_request(target.id),
        )
    }
}

async fn load_user(uow: &mut dyn UnitOfWork, user_id: ObjectId) -> Result<UserDoc> {
    uow.user(user_id)
        .await?
        .ok_or_else(|| CommunityError::Unauthorized("User not found".into()))
}

/// Admins, or the address's active owner
async fn authorize_manager(
    uow: &mut dyn UnitOfWork,
    actor: &UserDoc,
    address_id: ObjectId,
    denial: &str,
) -> Result<()> {
    if actor.is_admin || residency::is_active_owner(uow, address_id, actor.id).await? {
        Ok(())
    } else {
        Err(CommunityError::Forbidden(denial.to_string()))
    }
}

/// Point the user at the address's street and town and open a membership there
async fn place_user(
    uow: &mut dyn UnitOfWork,
    mut user: UserDoc,
    address: &AddressDoc,
    role: ResidentRole,
) -> Result<()> {
    user.place(address.id, role, address.street_group_id, address.town_id);
    uow.save_user(&user).await?;
    directory::enter_street(uow, user.id, address.street_group_id, address.town_id).await?;
    Ok(())
}
