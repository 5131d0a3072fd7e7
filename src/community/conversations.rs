//! Direct messages between two users

use bson::{oid::ObjectId, DateTime};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::community::views::{ConversationView, MessageView};
use crate::db::schemas::{member_hash, ConversationDoc, MessageDoc, UserDoc};
use crate::store::{not_found, settle, with_retry, Store, UnitOfWork};
use crate::types::{CommunityError, Result};

const MAX_MESSAGE_CHARS: usize = 5000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenConversation {
    pub other_user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessage {
    pub body: String,
}

pub struct ConversationService {
    store: Arc<dyn Store>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The conversation between the caller and another user, created on first
    /// use. The flag is true when it was created by this call.
    pub async fn open(&self, caller: &UserDoc, other_id: ObjectId) -> Result<(ConversationView, bool)> {
        if other_id == caller.id {
            return Err(CommunityError::Validation(
                "Cannot start a conversation with yourself".into(),
            ));
        }

        let (conversation, created) = with_retry!(self.store, "open_conversation", |uow| {
            Self::open_in(uow, caller.id, other_id)
        })?;

        if created {
            info!(conversation_id = %conversation.id, "Conversation started");
        }
        Ok((ConversationView::from(&conversation), created))
    }

    /// The caller's conversations, most recent activity first
    pub async fn list(&self, caller: &UserDoc) -> Result<Vec<ConversationView>> {
        let mut uow = self.store.begin().await?;
        let result = uow.conversations_for(caller.id).await;
        let conversations = settle(uow, result).await?;
        Ok(conversations.iter().map(ConversationView::from).collect())
    }

    /// Messages in one of the caller's conversations, oldest first
    pub async fn messages(&self, caller: &UserDoc, conversation_id: ObjectId) -> Result<Vec<MessageView>> {
        let mut uow = self.store.begin().await?;
        let result = Self::messages_in(&mut *uow, caller.id, conversation_id).await;
        let messages = settle(uow, result).await?;
        Ok(messages.iter().map(MessageView::from).collect())
    }

    pub async fn send(
        &self,
        caller: &UserDoc,
        conversation_id: ObjectId,
        input: &SendMessage,
    ) -> Result<MessageView> {
        let body = input.body.trim();
        if body.is_empty() {
            return Err(CommunityError::Validation("body is required".into()));
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(CommunityError::Validation(format!(
                "body must be at most {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        let message = MessageDoc::new(conversation_id, caller.id, body);

        let mut uow = self.store.begin().await?;
        let result = Self::send_in(&mut *uow, caller.id, &message).await;
        settle(uow, result).await?;
        Ok(MessageView::from(&message))
    }

    async fn open_in(
        uow: &mut dyn UnitOfWork,
        caller_id: ObjectId,
        other_id: ObjectId,
    ) -> Result<(ConversationDoc, bool)> {
        if let Some(existing) = uow.conversation_by_hash(&member_hash(&caller_id, &other_id)).await? {
            return Ok((existing, false));
        }
        if uow.user(other_id).await?.is_none() {
            return Err(not_found("User"));
        }

        let conversation = ConversationDoc::between(caller_id, other_id);
        uow.insert_conversation(&conversation).await?;
        Ok((conversation, true))
    }

    async fn messages_in(
        uow: &mut dyn UnitOfWork,
        caller_id: ObjectId,
        conversation_id: ObjectId,
    ) -> Result<Vec<MessageDoc>> {
        member_conversation(uow, caller_id, conversation_id).await?;
        uow.messages_for(conversation_id).await
    }

    async fn send_in(uow: &mut dyn UnitOfWork, caller_id: ObjectId, message: &MessageDoc) -> Result<()> {
        let mut conversation = member_conversation(uow, caller_id, message.conversation_id).await?;
        uow.insert_message(message).await?;
        conversation.last_message_at = Some(DateTime::now());
        uow.save_conversation(&conversation).await
    }
}

/// Load a conversation the caller belongs to. Non-members see `NotFound`.
async fn member_conversation(
    uow: &mut dyn UnitOfWork,
    caller_id: ObjectId,
    conversation_id: ObjectId,
) -> Result<ConversationDoc> {
    uow.conversation(conversation_id)
        .await?
        .filter(|c| c.has_member(&caller_id))
        .ok_or_else(|| not_found("Conversation"))
}
