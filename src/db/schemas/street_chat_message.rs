//! Street chat message schema (append-only log per street)

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{index, IntoIndexes, MutMetadata, Record};
use crate::db::schemas::Metadata;

pub const STREET_CHAT_COLLECTION: &str = "street_chat_messages";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StreetChatMessageDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// `created_at` is the server timestamp of the message
    #[serde(default)]
    pub metadata: Metadata,

    pub street_group_id: ObjectId,

    pub sender_id: ObjectId,

    pub sender_name: String,

    pub text: String,
}

impl StreetChatMessageDoc {
    pub fn new(street_group_id: ObjectId, sender_id: ObjectId, sender_name: &str, text: &str) -> Self {
        Self {
            id: ObjectId::new(),
            metadata: Metadata::new(),
            street_group_id,
            sender_id,
            sender_name: sender_name.to_string(),
            text: text.to_string(),
        }
    }
}

impl IntoIndexes for StreetChatMessageDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![index(
            doc! { "street_group_id": 1, "_id": -1 },
            "street_history_index",
            false,
        )]
    }
}

impl MutMetadata for StreetChatMessageDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for StreetChatMessageDoc {
    const COLLECTION: &'static str = STREET_CHAT_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}
