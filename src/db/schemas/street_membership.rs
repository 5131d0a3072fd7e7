//! Street membership history schema
//!
//! Append-only: joining appends a row, leaving stamps `left_at`. A user's
//! current membership in a street is the most recently joined open row.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{index, IntoIndexes, MutMetadata, Record};
use crate::db::schemas::Metadata;

pub const STREET_MEMBERSHIP_COLLECTION: &str = "street_memberships";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StreetMembershipDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: ObjectId,

    pub street_group_id: ObjectId,

    pub joined_at: DateTime,

    #[serde(default)]
    pub left_at: Option<DateTime>,
}

impl StreetMembershipDoc {
    pub fn new(user_id: ObjectId, street_group_id: ObjectId) -> Self {
        let now = DateTime::now();
        Self {
            id: ObjectId::new(),
            metadata: Metadata::at(now),
            user_id,
            street_group_id,
            joined_at: now,
            left_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.left_at.is_none()
    }
}

impl IntoIndexes for StreetMembershipDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![index(
            doc! { "user_id": 1, "street_group_id": 1, "joined_at": -1 },
            "user_street_joined_index",
            false,
        )]
    }
}

impl MutMetadata for StreetMembershipDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for StreetMembershipDoc {
    const COLLECTION: &'static str = STREET_MEMBERSHIP_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}
