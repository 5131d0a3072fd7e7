//! Street group document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{index, IntoIndexes, MutMetadata, Record};
use crate::db::schemas::Metadata;

pub const STREET_GROUP_COLLECTION: &str = "street_groups";

/// A named street within a town; the scope of street chat and street posts
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StreetGroupDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    pub town_id: ObjectId,

    pub name: String,

    #[serde(default)]
    pub member_count: i64,
}

impl StreetGroupDoc {
    pub fn new(town_id: ObjectId, name: &str) -> Self {
        Self {
            id: ObjectId::new(),
            metadata: Metadata::new(),
            town_id,
            name: name.to_string(),
            member_count: 0,
        }
    }
}

impl IntoIndexes for StreetGroupDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![index(
            doc! { "town_id": 1, "name": 1 },
            "town_name_unique",
            true,
        )]
    }
}

impl MutMetadata for StreetGroupDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for StreetGroupDoc {
    const COLLECTION: &'static str = STREET_GROUP_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}
