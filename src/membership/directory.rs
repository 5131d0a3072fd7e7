//! Street/Town directory
//!
//! Towns and street groups are created on first mention (find-or-create on
//! their natural key, inside the caller's unit). Street membership rows are
//! appended on entry and closed on exit; member counts follow them.

use bson::{oid::ObjectId, DateTime};
use tracing::debug;

use crate::db::schemas::{StreetGroupDoc, StreetMembershipDoc, TownDoc};
use crate::store::{not_found, UnitOfWork};
use crate::types::Result;

/// Resolve a town by exact name, creating it if unknown
pub async fn resolve_town(uow: &mut dyn UnitOfWork, name: &str) -> Result<TownDoc> {
    if let Some(town) = uow.town_by_name(name).await? {
        return Ok(town);
    }

    let town = TownDoc::new(name);
    uow.insert_town(&town).await?;
    debug!("Created town '{}' ({})", name, town.id);
    Ok(town)
}

/// Resolve a street within a town by exact name, creating it if unknown
pub async fn resolve_street(
    uow: &mut dyn UnitOfWork,
    town_id: ObjectId,
    name: &str,
) -> Result<StreetGroupDoc> {
    if let Some(street) = uow.street_by_name(town_id, name).await? {
        return Ok(street);
    }

    let street = StreetGroupDoc::new(town_id, name);
    uow.insert_street(&street).await?;
    debug!("Created street '{}' ({}) in town {}", name, street.id, town_id);
    Ok(street)
}

/// Append a membership row for the user and count them into street and town
pub async fn enter_street(
    uow: &mut dyn UnitOfWork,
    user_id: ObjectId,
    street_group_id: ObjectId,
    town_id: ObjectId,
) -> Result<StreetMembershipDoc> {
    let membership = StreetMembershipDoc::new(user_id, street_group_id);
    uow.insert_membership(&membership).await?;
    adjust_member_counts(uow, street_group_id, town_id, 1).await?;
    Ok(membership)
}

/// Close the user's open membership in a street, if any, and count them out
pub async fn leave_street(
    uow: &mut dyn UnitOfWork,
    user_id: ObjectId,
    street_group_id: ObjectId,
    town_id: Option<ObjectId>,
) -> Result<bool> {
    let Some(mut membership) = uow.current_membership(user_id, street_group_id).await? else {
        return Ok(false);
    };

    membership.left_at = Some(DateTime::now());
    uow.save_membership(&membership).await?;

    let mut street = uow
        .street(street_group_id)
        .await?
        .ok_or_else(|| not_found("Street"))?;
    street.member_count = (street.member_count - 1).max(0);
    uow.save_street(&street).await?;

    let town_id = town_id.unwrap_or(street.town_id);
    if let Some(mut town) = uow.town(town_id).await? {
        town.member_count = (town.member_count - 1).max(0);
        uow.save_town(&town).await?;
    }

    Ok(true)
}

async fn adjust_member_counts(
    uow: &mut dyn UnitOfWork,
    street_group_id: ObjectId,
    town_id: ObjectId,
    delta: i64,
) -> Result<()> {
    let mut street = uow
        .street(street_group_id)
        .await?
        .ok_or_else(|| not_found("Street"))?;
    street.member_count = (street.member_count + delta).max(0);
    uow.save_street(&street).await?;

    let mut town = uow.town(town_id).await?.ok_or_else(|| not_found("Town"))?;
    town.member_count = (town.member_count + delta).max(0);
    uow.save_town(&town).await?;

    Ok(())
}
