//! Address registry
//!
//! The ledger of which physical addresses exist, keyed by (postcode, line1).
//! Owner and resident count change only through the membership coordinator.

use bson::oid::ObjectId;

use crate::db::schemas::{normalize_postcode, AddressDoc, NewAddress};
use crate::store::{not_found, UnitOfWork};
use crate::types::Result;

/// Look an address up by its natural key. The postcode is normalized first.
pub async fn find_by_key(
    uow: &mut dyn UnitOfWork,
    postcode: &str,
    line1: &str,
) -> Result<Option<AddressDoc>> {
    uow.address_by_key(&normalize_postcode(postcode), line1.trim())
        .await
}

/// Load an address or fail with `NotFound`
pub async fn load(uow: &mut dyn UnitOfWork, address_id: ObjectId) -> Result<AddressDoc> {
    uow.address(address_id)
        .await?
        .ok_or_else(|| not_found("Address"))
}

/// Register a new address owned by its first claimant
pub async fn register_owned(
    uow: &mut dyn UnitOfWork,
    input: NewAddress<'_>,
    owner_id: ObjectId,
) -> Result<AddressDoc> {
    let mut address = AddressDoc::new(input);
    address.owner_user_id = Some(owner_id);
    address.resident_count = 1;
    uow.insert_address(&address).await?;
    Ok(address)
}

/// Shift the resident count, never below zero
pub fn adjust_resident_count(address: &mut AddressDoc, delta: i64) {
    address.resident_count = (address.resident_count + delta).max(0);
}
