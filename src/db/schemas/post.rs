//! Post and comment document schemas

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{index, IntoIndexes, MutMetadata, Record};
use crate::db::schemas::Metadata;

pub const POST_COLLECTION: &str = "posts";
pub const COMMENT_COLLECTION: &str = "comments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostCategory {
    ForSale,
    Free,
    Services,
    LostFound,
    Announcement,
    Event,
}

/// Who can see a post beyond its author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostVisibility {
    /// Members of the author's street
    #[default]
    Street,
    /// Anyone placed in the author's town
    StreetAndTown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostStatus {
    Active,
    /// Taken down by a moderator acting on a report
    Hidden,
    Deleted,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Active => "ACTIVE",
            PostStatus::Hidden => "HIDDEN",
            PostStatus::Deleted => "DELETED",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    pub author_id: ObjectId,

    pub street_group_id: ObjectId,

    pub town_id: ObjectId,

    pub category: PostCategory,

    pub title: String,

    pub body: String,

    pub visibility: PostVisibility,

    #[serde(default)]
    pub images: Vec<String>,

    pub status: PostStatus,
}

impl IntoIndexes for PostDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            index(doc! { "street_group_id": 1, "_id": -1 }, "street_feed_index", false),
            index(doc! { "town_id": 1, "visibility": 1 }, "town_visibility_index", false),
            index(doc! { "author_id": 1 }, "author_index", false),
        ]
    }
}

impl MutMetadata for PostDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for PostDoc {
    const COLLECTION: &'static str = POST_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CommentDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    pub post_id: ObjectId,

    pub author_id: ObjectId,

    pub body: String,
}

impl CommentDoc {
    pub fn new(post_id: ObjectId, author_id: ObjectId, body: &str) -> Self {
        Self {
            id: ObjectId::new(),
            metadata: Metadata::new(),
            post_id,
            author_id,
            body: body.to_string(),
        }
    }
}

impl IntoIndexes for CommentDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![index(doc! { "post_id": 1, "_id": 1 }, "post_thread_index", false)]
    }
}

impl MutMetadata for CommentDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for CommentDoc {
    const COLLECTION: &'static str = COMMENT_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_wire_names() {
        assert_eq!(
            serde_json::to_string(&PostCategory::LostFound).unwrap(),
            "\"LOST_FOUND\""
        );
        assert_eq!(
            serde_json::from_str::<PostVisibility>("\"STREET_AND_TOWN\"").unwrap(),
            PostVisibility::StreetAndTown
        );
        assert!(serde_json::from_str::<PostCategory>("\"GOSSIP\"").is_err());
    }
}
