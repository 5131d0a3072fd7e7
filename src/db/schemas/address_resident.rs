//! Address resident (claim record) schema
//!
//! One row per claim by a user on an address. Rows are never deleted; they
//! move through `PENDING -> ACTIVE -> REMOVED` (or `PENDING -> REMOVED`) and
//! form the audit trail of who lived where. The role is orthogonal to the
//! state and only changes on ownership transfer or vacancy promotion.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::{index, IntoIndexes, MutMetadata, Record};
use crate::db::schemas::Metadata;

pub const ADDRESS_RESIDENT_COLLECTION: &str = "address_residents";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResidentRole {
    Owner,
    Resident,
}

impl ResidentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResidentRole::Owner => "OWNER",
            ResidentRole::Resident => "RESIDENT",
        }
    }
}

impl fmt::Display for ResidentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResidentState {
    Pending,
    Active,
    Removed,
    Banned,
}

impl ResidentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResidentState::Pending => "PENDING",
            ResidentState::Active => "ACTIVE",
            ResidentState::Removed => "REMOVED",
            ResidentState::Banned => "BANNED",
        }
    }

    /// `REMOVED` and `BANNED` have no way out
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResidentState::Removed | ResidentState::Banned)
    }
}

impl fmt::Display for ResidentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AddressResidentDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    pub address_id: ObjectId,

    pub user_id: ObjectId,

    pub role: ResidentRole,

    pub state: ResidentState,

    pub requested_at: DateTime,

    #[serde(default)]
    pub approved_at: Option<DateTime>,

    #[serde(default)]
    pub removed_at: Option<DateTime>,
}

impl AddressResidentDoc {
    /// A resident request awaiting the owner's decision
    pub fn pending(address_id: ObjectId, user_id: ObjectId) -> Self {
        let now = DateTime::now();
        Self {
            id: ObjectId::new(),
            metadata: Metadata::at(now),
            address_id,
            user_id,
            role: ResidentRole::Resident,
            state: ResidentState::Pending,
            requested_at: now,
            approved_at: None,
            removed_at: None,
        }
    }

    /// An owner record that takes effect immediately
    pub fn active_owner(address_id: ObjectId, user_id: ObjectId) -> Self {
        let now = DateTime::now();
        Self {
            id: ObjectId::new(),
            metadata: Metadata::at(now),
            address_id,
            user_id,
            role: ResidentRole::Owner,
            state: ResidentState::Active,
            requested_at: now,
            approved_at: Some(now),
            removed_at: None,
        }
    }

    pub fn is_active_owner(&self) -> bool {
        self.state == ResidentState::Active && self.role == ResidentRole::Owner
    }

    pub fn activate(&mut self) {
        self.state = ResidentState::Active;
        self.approved_at = Some(DateTime::now());
    }

    pub fn remove(&mut self) {
        self.state = ResidentState::Removed;
        self.removed_at = Some(DateTime::now());
    }
}

impl IntoIndexes for AddressResidentDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            index(doc! { "address_id": 1, "state": 1 }, "address_state_index", false),
            index(doc! { "user_id": 1, "state": 1 }, "user_state_index", false),
            // At most one active owner per address, enforced by storage too
            (
                doc! { "address_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("one_active_owner".to_string())
                        .partial_filter_expression(doc! {
                            "state": ResidentState::Active.as_str(),
                            "role": ResidentRole::Owner.as_str(),
                        })
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AddressResidentDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for AddressResidentDoc {
    const COLLECTION: &'static str = ADDRESS_RESIDENT_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}
