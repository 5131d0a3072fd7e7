//! Direct message conversation and message schemas

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{index, IntoIndexes, MutMetadata, Record};
use crate::db::schemas::Metadata;

pub const CONVERSATION_COLLECTION: &str = "conversations";
pub const MESSAGE_COLLECTION: &str = "messages";

/// A two-person conversation, unique per unordered pair of members
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConversationDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    pub member_ids: Vec<ObjectId>,

    /// Sorted member ids joined by `:`
    pub member_hash: String,

    #[serde(default)]
    pub last_message_at: Option<DateTime>,
}

impl ConversationDoc {
    pub fn between(a: ObjectId, b: ObjectId) -> Self {
        Self {
            id: ObjectId::new(),
            metadata: Metadata::new(),
            member_ids: vec![a, b],
            member_hash: member_hash(&a, &b),
            last_message_at: None,
        }
    }

    pub fn has_member(&self, user_id: &ObjectId) -> bool {
        self.member_ids.contains(user_id)
    }

    /// Most recent activity, for ordering a user's inbox
    pub fn last_activity(&self) -> DateTime {
        self.last_message_at.unwrap_or(self.metadata.created_at)
    }
}

/// Order-independent key for a pair of users
pub fn member_hash(a: &ObjectId, b: &ObjectId) -> String {
    let mut ids = [a.to_hex(), b.to_hex()];
    ids.sort();
    ids.join(":")
}

impl IntoIndexes for ConversationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            index(doc! { "member_hash": 1 }, "member_hash_unique", true),
            index(doc! { "member_ids": 1 }, "member_index", false),
        ]
    }
}

impl MutMetadata for ConversationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for ConversationDoc {
    const COLLECTION: &'static str = CONVERSATION_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MessageDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    pub conversation_id: ObjectId,

    pub sender_id: ObjectId,

    pub body: String,
}

impl MessageDoc {
    pub fn new(conversation_id: ObjectId, sender_id: ObjectId, body: &str) -> Self {
        Self {
            id: ObjectId::new(),
            metadata: Metadata::new(),
            conversation_id,
            sender_id,
            body: body.to_string(),
        }
    }
}

impl IntoIndexes for MessageDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![index(
            doc! { "conversation_id": 1, "_id": 1 },
            "conversation_history_index",
            false,
        )]
    }
}

impl MutMetadata for MessageDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for MessageDoc {
    const COLLECTION: &'static str = MESSAGE_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_hash_is_order_independent() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_eq!(member_hash(&a, &b), member_hash(&b, &a));
        assert_ne!(member_hash(&a, &a), member_hash(&a, &b));
    }
}
