//! User document schema
//!
//! Credentials plus the four placement pointers that mirror the user's
//! current residency and street membership. Only the membership coordinator
//! writes those four fields.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{index, IntoIndexes, MutMetadata, Record};
use crate::db::schemas::{Metadata, ResidentRole};

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    /// Lower-cased email, unique
    pub email: String,

    /// Argon2 password hash
    pub password_hash: String,

    pub first_name: String,

    /// Upper-cased postcode given at registration
    pub postcode: String,

    #[serde(default)]
    pub is_admin: bool,

    #[serde(default)]
    pub email_verified_at: Option<DateTime>,

    #[serde(default)]
    pub address_id: Option<ObjectId>,

    #[serde(default)]
    pub address_role: Option<ResidentRole>,

    #[serde(default)]
    pub street_group_id: Option<ObjectId>,

    #[serde(default)]
    pub town_id: Option<ObjectId>,
}

impl UserDoc {
    /// Create a new user document
    pub fn new(email: &str, password_hash: &str, first_name: &str, postcode: &str) -> Self {
        Self {
            id: ObjectId::new(),
            metadata: Metadata::new(),
            email: email.trim().to_lowercase(),
            password_hash: password_hash.to_string(),
            first_name: first_name.trim().to_string(),
            postcode: postcode.trim().to_uppercase(),
            is_admin: false,
            email_verified_at: None,
            address_id: None,
            address_role: None,
            street_group_id: None,
            town_id: None,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    /// Point the user at their current address and street
    pub fn place(
        &mut self,
        address_id: ObjectId,
        role: ResidentRole,
        street_group_id: ObjectId,
        town_id: ObjectId,
    ) {
        self.address_id = Some(address_id);
        self.address_role = Some(role);
        self.street_group_id = Some(street_group_id);
        self.town_id = Some(town_id);
    }

    /// Clear all four placement pointers
    pub fn unplace(&mut self) {
        self.address_id = None;
        self.address_role = None;
        self.street_group_id = None;
        self.town_id = None;
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            index(doc! { "email": 1 }, "email_unique", true),
            index(doc! { "address_id": 1 }, "address_index", false),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for UserDoc {
    const COLLECTION: &'static str = USER_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}
