//! Persistence behind a unit-of-work seam
//!
//! Every read and write goes through a [`UnitOfWork`] opened by a [`Store`].
//! A unit is all-or-nothing: its writes become visible on [`UnitOfWork::commit`]
//! and are discarded on [`UnitOfWork::abort`] or drop.
//!
//! Two implementations:
//! - [`MongoStore`]: one MongoDB multi-document transaction per unit
//! - [`MemoryStore`]: process memory, one unit at a time (serializable)

use async_trait::async_trait;
use bson::{oid::ObjectId, DateTime};
use tracing::warn;

use crate::db::schemas::{
    AddressDoc, AddressResidentDoc, CommentDoc, ConversationDoc, MessageDoc, PostDoc, PostStatus,
    ReportDoc, ReportStatus, ResidentRole, ResidentState, StreetChatMessageDoc, StreetGroupDoc,
    StreetMembershipDoc, TownDoc, UserDoc,
};
use crate::types::{CommunityError, Result};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// How many times an operation is attempted when its unit hits a conflict
pub const MAX_UNIT_ATTEMPTS: u32 = 3;

/// Which users to count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCount {
    All,
    Verified,
    Admins,
}

/// Filter over address resident records. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct ResidentQuery {
    pub address_id: Option<ObjectId>,
    pub user_id: Option<ObjectId>,
    pub states: Vec<ResidentState>,
    pub role: Option<ResidentRole>,
}

impl ResidentQuery {
    /// Records on one address
    pub fn at(address_id: ObjectId) -> Self {
        Self {
            address_id: Some(address_id),
            ..Default::default()
        }
    }

    /// Records held by one user anywhere
    pub fn held_by(user_id: ObjectId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: ObjectId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn states(mut self, states: &[ResidentState]) -> Self {
        self.states = states.to_vec();
        self
    }

    pub fn role(mut self, role: ResidentRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn matches(&self, record: &AddressResidentDoc) -> bool {
        self.address_id.map_or(true, |id| record.address_id == id)
            && self.user_id.map_or(true, |id| record.user_id == id)
            && (self.states.is_empty() || self.states.contains(&record.state))
            && self.role.map_or(true, |role| record.role == role)
    }
}

/// One backward page of a street's chat log
#[derive(Debug, Clone)]
pub struct ChatPageQuery {
    pub street_group_id: ObjectId,
    /// Only messages created at or after this instant
    pub since: DateTime,
    /// Only messages with an id below this one
    pub before: Option<ObjectId>,
    pub limit: i64,
}

impl ChatPageQuery {
    pub fn matches(&self, message: &StreetChatMessageDoc) -> bool {
        message.street_group_id == self.street_group_id
            && message.metadata.created_at >= self.since
            && self.before.map_or(true, |cursor| message.id < cursor)
    }
}

/// Opens units of work
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Backend name for logs
    fn backend(&self) -> &'static str;
}

/// A scoped transactional unit. Inserts fail with `Conflict` when they would
/// break a unique key.
#[async_trait]
pub trait UnitOfWork: Send {
    // Users
    async fn user(&mut self, id: ObjectId) -> Result<Option<UserDoc>>;
    async fn user_by_email(&mut self, email: &str) -> Result<Option<UserDoc>>;
    async fn insert_user(&mut self, user: &UserDoc) -> Result<()>;
    async fn save_user(&mut self, user: &UserDoc) -> Result<()>;
    async fn count_users(&mut self, which: UserCount) -> Result<u64>;

    // Towns
    async fn town(&mut self, id: ObjectId) -> Result<Option<TownDoc>>;
    async fn town_by_name(&mut self, name: &str) -> Result<Option<TownDoc>>;
    async fn insert_town(&mut self, town: &TownDoc) -> Result<()>;
    async fn save_town(&mut self, town: &TownDoc) -> Result<()>;
    async fn count_towns(&mut self) -> Result<u64>;

    // Street groups
    async fn street(&mut self, id: ObjectId) -> Result<Option<StreetGroupDoc>>;
    async fn street_by_name(&mut self, town_id: ObjectId, name: &str) -> Result<Option<StreetGroupDoc>>;
    async fn insert_street(&mut self, street: &StreetGroupDoc) -> Result<()>;
    async fn save_street(&mut self, street: &StreetGroupDoc) -> Result<()>;
    async fn count_streets(&mut self) -> Result<u64>;

    // Addresses
    async fn address(&mut self, id: ObjectId) -> Result<Option<AddressDoc>>;
    async fn address_by_key(&mut self, postcode: &str, line1: &str) -> Result<Option<AddressDoc>>;
    async fn addresses_by_postcode(&mut self, postcode: &str) -> Result<Vec<AddressDoc>>;
    async fn insert_address(&mut self, address: &AddressDoc) -> Result<()>;
    async fn save_address(&mut self, address: &AddressDoc) -> Result<()>;

    // Address residents
    async fn resident(&mut self, id: ObjectId) -> Result<Option<AddressResidentDoc>>;
    /// Matching records, oldest first
    async fn residents(&mut self, query: &ResidentQuery) -> Result<Vec<AddressResidentDoc>>;
    async fn insert_resident(&mut self, record: &AddressResidentDoc) -> Result<()>;
    async fn save_resident(&mut self, record: &AddressResidentDoc) -> Result<()>;

    // Street memberships
    /// Most recently joined open membership of a user in a street
    async fn current_membership(
        &mut self,
        user_id: ObjectId,
        street_group_id: ObjectId,
    ) -> Result<Option<StreetMembershipDoc>>;
    async fn insert_membership(&mut self, membership: &StreetMembershipDoc) -> Result<()>;
    async fn save_membership(&mut self, membership: &StreetMembershipDoc) -> Result<()>;

    // Street chat
    async fn insert_chat_message(&mut self, message: &StreetChatMessageDoc) -> Result<()>;
    /// Matching messages, newest first, at most `limit`
    async fn chat_page(&mut self, query: &ChatPageQuery) -> Result<Vec<StreetChatMessageDoc>>;

    // Posts and comments
    async fn post(&mut self, id: ObjectId) -> Result<Option<PostDoc>>;
    async fn insert_post(&mut self, post: &PostDoc) -> Result<()>;
    async fn save_post(&mut self, post: &PostDoc) -> Result<()>;
    async fn count_posts(&mut self, status: PostStatus) -> Result<u64>;
    async fn comment(&mut self, id: ObjectId) -> Result<Option<CommentDoc>>;
    async fn insert_comment(&mut self, comment: &CommentDoc) -> Result<()>;
    /// Comments on a post, oldest first
    async fn comments_for_post(&mut self, post_id: ObjectId) -> Result<Vec<CommentDoc>>;

    // Conversations
    async fn conversation(&mut self, id: ObjectId) -> Result<Option<ConversationDoc>>;
    async fn conversation_by_hash(&mut self, member_hash: &str) -> Result<Option<ConversationDoc>>;
    async fn insert_conversation(&mut self, conversation: &ConversationDoc) -> Result<()>;
    async fn save_conversation(&mut self, conversation: &ConversationDoc) -> Result<()>;
    /// Conversations a user belongs to, most recent activity first
    async fn conversations_for(&mut self, user_id: ObjectId) -> Result<Vec<ConversationDoc>>;
    async fn insert_message(&mut self, message: &MessageDoc) -> Result<()>;
    /// Messages in a conversation, oldest first
    async fn messages_for(&mut self, conversation_id: ObjectId) -> Result<Vec<MessageDoc>>;

    // Reports
    async fn report(&mut self, id: ObjectId) -> Result<Option<ReportDoc>>;
    async fn insert_report(&mut self, report: &ReportDoc) -> Result<()>;
    async fn save_report(&mut self, report: &ReportDoc) -> Result<()>;
    /// Reports in a status, newest first
    async fn reports_with_status(&mut self, status: ReportStatus) -> Result<Vec<ReportDoc>>;
    async fn count_reports(&mut self, status: ReportStatus) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn abort(self: Box<Self>) -> Result<()>;
}

/// Commit on success, abort on failure, and hand back the outcome
pub async fn settle<T>(uow: Box<dyn UnitOfWork>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(abort_err) = uow.abort().await {
                warn!("Failed to abort unit of work: {}", abort_err);
            }
            Err(err)
        }
    }
}

/// Run `$body` inside a fresh unit, retrying the whole unit on `Conflict`.
///
/// `$uow` is bound to `&mut dyn UnitOfWork` for the body.
macro_rules! with_retry {
    ($store:expr, $op:expr, |$uow:ident| $body:expr) => {{
        let mut attempt: u32 = 1;
        loop {
            let mut unit = $store.begin().await?;
            let result = {
                let $uow: &mut dyn $crate::store::UnitOfWork = &mut *unit;
                $body.await
            };
            match $crate::store::settle(unit, result).await {
                Err($crate::types::CommunityError::Conflict(reason))
                    if attempt < $crate::store::MAX_UNIT_ATTEMPTS =>
                {
                    tracing::warn!(
                        operation = $op,
                        attempt,
                        "Unit of work conflicted, retrying: {}",
                        reason
                    );
                    attempt += 1;
                }
                outcome => break outcome,
            }
        }
    }};
}

pub(crate) use with_retry;

/// Shorthand for a missing record
pub(crate) fn not_found(what: &str) -> CommunityError {
    CommunityError::NotFound(format!("{} not found", what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Adds "Irvine" unless it is already there; returns the town count it saw
    async fn add_town(uow: &mut dyn UnitOfWork, attempts: &AtomicU32) -> Result<u64> {
        attempts.fetch_add(1, Ordering::SeqCst);
        let seen = uow.count_towns().await?;
        if uow.town_by_name("Irvine").await?.is_none() {
            uow.insert_town(&TownDoc::new("Irvine")).await?;
        }
        Ok(seen)
    }

    async fn add_town_with_retry(store: &MemoryStore, attempts: &AtomicU32) -> Result<u64> {
        with_retry!(store, "add_town", |uow| add_town(uow, attempts))
    }

    async fn town_count(store: &MemoryStore) -> u64 {
        let mut uow = store.begin().await.unwrap();
        uow.count_towns().await.unwrap()
    }

    #[tokio::test]
    async fn test_conflicted_commit_reruns_on_fresh_state() {
        let store = MemoryStore::new();
        store.refuse_next_commits(1);
        let attempts = AtomicU32::new(0);

        let seen = add_town_with_retry(&store, &attempts).await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // The refused attempt's insert never landed
        assert_eq!(seen, 0);
        assert_eq!(town_count(&store).await, 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let store = MemoryStore::new();
        store.refuse_next_commits(MAX_UNIT_ATTEMPTS + 1);
        let attempts = AtomicU32::new(0);

        let result = add_town_with_retry(&store, &attempts).await;

        assert!(matches!(result, Err(CommunityError::Conflict(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_UNIT_ATTEMPTS);
        assert_eq!(town_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let store = MemoryStore::new();
        let attempts = AtomicU32::new(0);

        let result: Result<()> = async {
            with_retry!(store, "missing", |uow| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                uow.town(ObjectId::new())
                    .await?
                    .map(|_| ())
                    .ok_or_else(|| not_found("Town"))
            })
        }
        .await;

        assert!(matches!(result, Err(CommunityError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resident_query_matches() {
        let address_id = ObjectId::new();
        let user_id = ObjectId::new();
        let record = AddressResidentDoc::pending(address_id, user_id);

        assert!(ResidentQuery::at(address_id).user(user_id).matches(&record));
        assert!(ResidentQuery::held_by(user_id)
            .states(&[ResidentState::Pending, ResidentState::Active])
            .matches(&record));
        assert!(!ResidentQuery::at(address_id)
            .states(&[ResidentState::Active])
            .matches(&record));
        assert!(!ResidentQuery::at(address_id)
            .role(ResidentRole::Owner)
            .matches(&record));
    }
}
