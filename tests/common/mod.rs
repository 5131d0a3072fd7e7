//! Shared fixtures for the integration tests

#![allow(dead_code)]

use bson::{oid::ObjectId, DateTime};
use std::sync::Arc;

use connected_community::db::schemas::{AddressDoc, AddressResidentDoc, UserDoc};
use connected_community::logging::AuditLogger;
use connected_community::membership::{JoinRequest, MembershipCoordinator};
use connected_community::store::{MemoryStore, ResidentQuery, Store, UnitOfWork};

pub fn memory_store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

pub fn coordinator(store: &Arc<dyn Store>) -> MembershipCoordinator {
    MembershipCoordinator::new(Arc::clone(store), AuditLogger::new())
}

/// Insert a user whose email is already verified
pub async fn verified_user(store: &Arc<dyn Store>, first_name: &str) -> UserDoc {
    let email = format!("{}-{}@example.com", first_name.to_lowercase(), ObjectId::new());
    let mut user = UserDoc::new(&email, "not-a-real-hash", first_name, "KA12 8EE");
    user.email_verified_at = Some(DateTime::now());
    insert_user(store, &user).await;
    user
}

pub async fn admin_user(store: &Arc<dyn Store>) -> UserDoc {
    let email = format!("admin-{}@example.com", ObjectId::new());
    let mut user = UserDoc::new(&email, "not-a-real-hash", "Admin", "KA12 8EE");
    user.email_verified_at = Some(DateTime::now());
    user.is_admin = true;
    insert_user(store, &user).await;
    user
}

pub async fn insert_user(store: &Arc<dyn Store>, user: &UserDoc) {
    let mut uow = store.begin().await.unwrap();
    uow.insert_user(user).await.unwrap();
    uow.commit().await.unwrap();
}

pub async fn mark_verified(store: &Arc<dyn Store>, email: &str) -> UserDoc {
    let mut uow = store.begin().await.unwrap();
    let mut user = uow.user_by_email(email).await.unwrap().unwrap();
    user.email_verified_at = Some(DateTime::now());
    uow.save_user(&user).await.unwrap();
    uow.commit().await.unwrap();
    user
}

pub async fn fetch_user(store: &Arc<dyn Store>, id: ObjectId) -> UserDoc {
    let mut uow = store.begin().await.unwrap();
    let user = uow.user(id).await.unwrap().unwrap();
    uow.abort().await.unwrap();
    user
}

pub async fn fetch_address(store: &Arc<dyn Store>, id: ObjectId) -> AddressDoc {
    let mut uow = store.begin().await.unwrap();
    let address = uow.address(id).await.unwrap().unwrap();
    uow.abort().await.unwrap();
    address
}

/// Every resident record on an address, oldest first
pub async fn residents_at(store: &Arc<dyn Store>, address_id: ObjectId) -> Vec<AddressResidentDoc> {
    let mut uow = store.begin().await.unwrap();
    let records = uow.residents(&ResidentQuery::at(address_id)).await.unwrap();
    uow.abort().await.unwrap();
    records
}

pub fn high_street() -> JoinRequest {
    join_request("1 High Street", "KA12 8EE", "Irvine", "High Street")
}

pub fn join_request(line1: &str, postcode: &str, town: &str, street: &str) -> JoinRequest {
    JoinRequest {
        line1: line1.to_string(),
        line2: None,
        postcode: postcode.to_string(),
        town: town.to_string(),
        street_name: street.to_string(),
    }
}
