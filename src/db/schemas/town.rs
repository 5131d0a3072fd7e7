//! Town document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{index, IntoIndexes, MutMetadata, Record};
use crate::db::schemas::Metadata;

pub const TOWN_COLLECTION: &str = "towns";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TownDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    /// Exact name as first referenced, unique
    pub name: String,

    /// Active residents placed in this town
    #[serde(default)]
    pub member_count: i64,

    #[serde(default)]
    pub lat: Option<f64>,

    #[serde(default)]
    pub lng: Option<f64>,
}

impl TownDoc {
    pub fn new(name: &str) -> Self {
        Self {
            id: ObjectId::new(),
            metadata: Metadata::new(),
            name: name.to_string(),
            member_count: 0,
            lat: None,
            lng: None,
        }
    }
}

impl IntoIndexes for TownDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![index(doc! { "name": 1 }, "name_unique", true)]
    }
}

impl MutMetadata for TownDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for TownDoc {
    const COLLECTION: &'static str = TOWN_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}
