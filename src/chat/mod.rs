//! Street chat relay
//!
//! Fan-out of chat text to the members of a street. Admission to a room and
//! every post re-check that the caller is email-verified and holds a current
//! membership of the street. Messages from the socket and from the HTTP
//! endpoint go through [`StreetChat::post`], so both paths persist to the same
//! log and broadcast the same record; clients de-duplicate on `id`.
//!
//! History is bounded below by the caller's current `joined_at` and paged
//! backward by id.

pub mod rooms;
pub mod socket;

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::db::schemas::{StreetChatMessageDoc, StreetMembershipDoc};
use crate::store::{settle, ChatPageQuery, Store, UnitOfWork};
use crate::types::{CommunityError, Result};

pub use rooms::StreetRooms;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 50;
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// A chat message as sent to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageView {
    pub id: String,
    pub street_group_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub created_at: String,
}

impl From<&StreetChatMessageDoc> for ChatMessageView {
    fn from(doc: &StreetChatMessageDoc) -> Self {
        Self {
            id: doc.id.to_hex(),
            street_group_id: doc.street_group_id.to_hex(),
            sender_id: doc.sender_id.to_hex(),
            sender_name: doc.sender_name.clone(),
            text: doc.text.clone(),
            created_at: doc.metadata.created_at.to_chrono().to_rfc3339(),
        }
    }
}

/// One page of history, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPage {
    pub messages: Vec<ChatMessageView>,
    /// Pass back as `cursor` to fetch older messages
    pub next_cursor: Option<String>,
}

/// Clamp a requested page size into `1..=50`, defaulting to 20
pub fn page_size(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE)
}

/// Trimmed message text, or why it is unacceptable
pub fn clean_text(text: &str) -> Result<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CommunityError::Validation("Message text is required".into()));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(CommunityError::Validation(format!(
            "Message text must be at most {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(text)
}

/// Street chat service
pub struct StreetChat {
    store: Arc<dyn Store>,
    rooms: StreetRooms,
}

impl StreetChat {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            rooms: StreetRooms::new(),
        }
    }

    pub fn rooms(&self) -> &StreetRooms {
        &self.rooms
    }

    /// Admit a socket to a street's room. Refusals are silent.
    pub async fn join_room(
        &self,
        user_id: ObjectId,
        street_group_id: ObjectId,
    ) -> Option<broadcast::Receiver<ChatMessageView>> {
        match self.membership(user_id, street_group_id).await {
            Ok(_) => Some(self.rooms.subscribe(street_group_id)),
            Err(e) => {
                debug!("Room join by {} for {} dropped: {}", user_id, street_group_id, e);
                None
            }
        }
    }

    /// Next broadcast for a room subscriber. Membership is re-checked before
    /// each delivery; `None` once the subscriber may no longer read the street
    /// or the room has closed.
    pub async fn next_for(
        &self,
        user_id: ObjectId,
        street_group_id: ObjectId,
        rx: &mut broadcast::Receiver<ChatMessageView>,
    ) -> Option<ChatMessageView> {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    if let Err(e) = self.membership(user_id, street_group_id).await {
                        debug!("User {} dropped from room {}: {}", user_id, street_group_id, e);
                        return None;
                    }
                    return Some(message);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Chat subscriber lagged, skipped {} message(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Persist a message from a current member and broadcast it
    pub async fn post(
        &self,
        user_id: ObjectId,
        street_group_id: ObjectId,
        text: &str,
    ) -> Result<ChatMessageView> {
        let text = clean_text(text)?;

        let mut uow = self.store.begin().await?;
        let result = Self::post_in(&mut *uow, user_id, street_group_id, text).await;
        let message = settle(uow, result).await?;

        let view = ChatMessageView::from(&message);
        self.rooms.publish(&view, street_group_id);
        Ok(view)
    }

    /// A page of history visible to the caller
    pub async fn history(
        &self,
        user_id: ObjectId,
        street_group_id: ObjectId,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<ChatPage> {
        let before = cursor
            .filter(|c| !c.is_empty())
            .map(|c| {
                ObjectId::parse_str(c)
                    .map_err(|_| CommunityError::Validation("Invalid cursor".into()))
            })
            .transpose()?;
        let limit = page_size(limit);

        let mut uow = self.store.begin().await?;
        let result = Self::history_in(&mut *uow, user_id, street_group_id, before, limit).await;
        let mut newest_first = settle(uow, result).await?;

        let has_more = newest_first.len() as i64 > limit;
        newest_first.truncate(limit as usize);
        let next_cursor = if has_more {
            newest_first.last().map(|m| m.id.to_hex())
        } else {
            None
        };

        Ok(ChatPage {
            messages: newest_first.iter().rev().map(ChatMessageView::from).collect(),
            next_cursor,
        })
    }

    /// The caller's current membership, if they may use this street's chat
    pub async fn membership(
        &self,
        user_id: ObjectId,
        street_group_id: ObjectId,
    ) -> Result<StreetMembershipDoc> {
        let mut uow = self.store.begin().await?;
        let result = current_member(&mut *uow, user_id, street_group_id).await;
        settle(uow, result).await
    }

    async fn post_in(
        uow: &mut dyn UnitOfWork,
        user_id: ObjectId,
        street_group_id: ObjectId,
        text: &str,
    ) -> Result<StreetChatMessageDoc> {
        current_member(uow, user_id, street_group_id).await?;
        let sender = uow
            .user(user_id)
            .await?
            .ok_or_else(|| CommunityError::Unauthorized("User not found".into()))?;

        let message = StreetChatMessageDoc::new(street_group_id, user_id, &sender.first_name, text);
        uow.insert_chat_message(&message).await?;
        Ok(message)
    }

    async fn history_in(
        uow: &mut dyn UnitOfWork,
        user_id: ObjectId,
        street_group_id: ObjectId,
        before: Option<ObjectId>,
        limit: i64,
    ) -> Result<Vec<StreetChatMessageDoc>> {
        let membership = current_member(uow, user_id, street_group_id).await?;
        uow.chat_page(&ChatPageQuery {
            street_group_id,
            since: membership.joined_at,
            before,
            limit: limit + 1,
        })
        .await
    }
}

/// Verified user with an open membership in the street
async fn current_member(
    uow: &mut dyn UnitOfWork,
    user_id: ObjectId,
    street_group_id: ObjectId,
) -> Result<StreetMembershipDoc> {
    let user = uow
        .user(user_id)
        .await?
        .ok_or_else(|| CommunityError::Unauthorized("User not found".into()))?;
    if !user.is_verified() {
        return Err(CommunityError::Forbidden(
            "Please verify your email to continue".into(),
        ));
    }

    uow.current_membership(user_id, street_group_id)
        .await?
        .ok_or_else(|| CommunityError::Forbidden("Not a member of this street".into()))
}
