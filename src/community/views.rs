//! JSON views returned by the API
//!
//! Ids are hex strings and timestamps RFC 3339.

use bson::{oid::ObjectId, DateTime};
use serde::Serialize;

use crate::db::schemas::{
    AddressDoc, AddressResidentDoc, CommentDoc, ConversationDoc, MessageDoc, PostCategory,
    PostDoc, PostStatus, PostVisibility, ReportDoc, ReportStatus, ReportTarget, ResidentRole,
    ResidentState, UserDoc,
};

pub fn rfc3339(at: DateTime) -> String {
    at.to_chrono().to_rfc3339()
}

fn hex(id: Option<ObjectId>) -> Option<String> {
    id.map(|id| id.to_hex())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub postcode: String,
    pub is_admin: bool,
    pub email_verified_at: Option<String>,
    pub address_id: Option<String>,
    pub address_role: Option<ResidentRole>,
    pub street_group_id: Option<String>,
    pub town_id: Option<String>,
}

impl From<&UserDoc> for UserView {
    fn from(user: &UserDoc) -> Self {
        Self {
            id: user.id.to_hex(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            postcode: user.postcode.clone(),
            is_admin: user.is_admin,
            email_verified_at: user.email_verified_at.map(rfc3339),
            address_id: hex(user.address_id),
            address_role: user.address_role,
            street_group_id: hex(user.street_group_id),
            town_id: hex(user.town_id),
        }
    }
}

/// Identity returned at login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub is_admin: bool,
}

impl From<&UserDoc> for SessionUser {
    fn from(user: &UserDoc) -> Self {
        Self {
            id: user.id.to_hex(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressView {
    pub id: String,
    pub line1: String,
    pub line2: Option<String>,
    pub town: String,
    pub postcode: String,
    pub owner_user_id: Option<String>,
    pub resident_count: i64,
    pub street_group_id: String,
    pub town_id: String,
}

impl From<&AddressDoc> for AddressView {
    fn from(address: &AddressDoc) -> Self {
        Self {
            id: address.id.to_hex(),
            line1: address.line1.clone(),
            line2: address.line2.clone(),
            town: address.town.clone(),
            postcode: address.postcode.clone(),
            owner_user_id: hex(address.owner_user_id),
            resident_count: address.resident_count,
            street_group_id: address.street_group_id.to_hex(),
            town_id: address.town_id.to_hex(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidentView {
    pub id: String,
    pub address_id: String,
    pub user_id: String,
    pub role: ResidentRole,
    pub state: ResidentState,
    pub requested_at: String,
    pub approved_at: Option<String>,
    pub removed_at: Option<String>,
}

impl From<&AddressResidentDoc> for ResidentView {
    fn from(record: &AddressResidentDoc) -> Self {
        Self {
            id: record.id.to_hex(),
            address_id: record.address_id.to_hex(),
            user_id: record.user_id.to_hex(),
            role: record.role,
            state: record.state,
            requested_at: rfc3339(record.requested_at),
            approved_at: record.approved_at.map(rfc3339),
            removed_at: record.removed_at.map(rfc3339),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub author_id: String,
    pub street_group_id: String,
    pub town_id: String,
    pub category: PostCategory,
    pub title: String,
    pub body: String,
    pub visibility: PostVisibility,
    pub images: Vec<String>,
    pub status: PostStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&PostDoc> for PostView {
    fn from(post: &PostDoc) -> Self {
        Self {
            id: post.id.to_hex(),
            author_id: post.author_id.to_hex(),
            street_group_id: post.street_group_id.to_hex(),
            town_id: post.town_id.to_hex(),
            category: post.category,
            title: post.title.clone(),
            body: post.body.clone(),
            visibility: post.visibility,
            images: post.images.clone(),
            status: post.status,
            created_at: rfc3339(post.metadata.created_at),
            updated_at: rfc3339(post.metadata.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: String,
}

impl From<&CommentDoc> for CommentView {
    fn from(comment: &CommentDoc) -> Self {
        Self {
            id: comment.id.to_hex(),
            post_id: comment.post_id.to_hex(),
            author_id: comment.author_id.to_hex(),
            body: comment.body.clone(),
            created_at: rfc3339(comment.metadata.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: String,
    pub member_ids: Vec<String>,
    pub last_message_at: Option<String>,
    pub created_at: String,
}

impl From<&ConversationDoc> for ConversationView {
    fn from(conversation: &ConversationDoc) -> Self {
        Self {
            id: conversation.id.to_hex(),
            member_ids: conversation.member_ids.iter().map(|id| id.to_hex()).collect(),
            last_message_at: conversation.last_message_at.map(rfc3339),
            created_at: rfc3339(conversation.metadata.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: String,
}

impl From<&MessageDoc> for MessageView {
    fn from(message: &MessageDoc) -> Self {
        Self {
            id: message.id.to_hex(),
            conversation_id: message.conversation_id.to_hex(),
            sender_id: message.sender_id.to_hex(),
            body: message.body.clone(),
            created_at: rfc3339(message.metadata.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub id: String,
    pub reporter_id: String,
    pub target_type: ReportTarget,
    pub target_id: String,
    pub reason: String,
    pub status: ReportStatus,
    pub handled_by: Option<String>,
    pub handled_at: Option<String>,
    pub created_at: String,
}

impl From<&ReportDoc> for ReportView {
    fn from(report: &ReportDoc) -> Self {
        Self {
            id: report.id.to_hex(),
            reporter_id: report.reporter_id.to_hex(),
            target_type: report.target_type,
            target_id: report.target_id.to_hex(),
            reason: report.reason.clone(),
            status: report.status,
            handled_by: hex(report.handled_by),
            handled_at: report.handled_at.map(rfc3339),
            created_at: rfc3339(report.metadata.created_at),
        }
    }
}
