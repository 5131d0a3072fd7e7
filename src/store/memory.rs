//! In-memory store
//!
//! Used in development without MongoDB and by the test suite. A unit holds the
//! store lock for its whole lifetime and works on a private copy of the state,
//! so units run one after another and an aborted unit leaves nothing behind.
//! Unique keys match the MongoDB indexes.

use async_trait::async_trait;
use bson::oid::ObjectId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ChatPageQuery, ResidentQuery, Store, UnitOfWork, UserCount};
use crate::db::schemas::{
    AddressDoc, AddressResidentDoc, CommentDoc, ConversationDoc, MessageDoc, PostDoc, PostStatus,
    ReportDoc, ReportStatus, StreetChatMessageDoc, StreetGroupDoc, StreetMembershipDoc, TownDoc,
    UserDoc,
};
use crate::db::{MutMetadata, Record};
use crate::types::{CommunityError, Result};

type Table<T> = BTreeMap<ObjectId, T>;

#[derive(Clone, Default)]
struct MemoryState {
    users: Table<UserDoc>,
    towns: Table<TownDoc>,
    streets: Table<StreetGroupDoc>,
    addresses: Table<AddressDoc>,
    residents: Table<AddressResidentDoc>,
    memberships: Table<StreetMembershipDoc>,
    chat: Table<StreetChatMessageDoc>,
    posts: Table<PostDoc>,
    comments: Table<CommentDoc>,
    conversations: Table<ConversationDoc>,
    messages: Table<MessageDoc>,
    reports: Table<ReportDoc>,
}

/// Process-local store
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    refused_commits: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` commits with `Conflict`, the way a MongoDB
    /// transaction that lost a write race does. The refused unit's writes are
    /// discarded.
    pub fn refuse_next_commits(&self, count: u32) {
        self.refused_commits.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnit {
            guard,
            working,
            refused_commits: Arc::clone(&self.refused_commits),
        }))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    refused_commits: Arc<AtomicU32>,
}

fn get<T: Clone>(table: &Table<T>, id: ObjectId) -> Option<T> {
    table.get(&id).cloned()
}

fn find<T: Clone>(table: &Table<T>, pred: impl Fn(&T) -> bool) -> Option<T> {
    table.values().find(|doc| pred(doc)).cloned()
}

fn filter<T: Clone>(table: &Table<T>, pred: impl Fn(&T) -> bool) -> Vec<T> {
    table.values().filter(|doc| pred(doc)).cloned().collect()
}

/// Insert, refusing when another document already holds the same unique key
fn insert<T: Record>(
    table: &mut Table<T>,
    doc: &T,
    clashes: impl Fn(&T, &T) -> bool,
) -> Result<()> {
    let id = doc.id();
    if table.contains_key(&id) {
        return Err(duplicate(T::COLLECTION, "_id"));
    }
    if table.values().any(|existing| clashes(existing, doc)) {
        return Err(duplicate(T::COLLECTION, "unique key"));
    }
    table.insert(id, doc.clone());
    Ok(())
}

/// Replace an existing document, stamping its update time
fn save<T: Record>(
    table: &mut Table<T>,
    doc: &T,
    clashes: impl Fn(&T, &T) -> bool,
) -> Result<()> {
    let id = doc.id();
    if !table.contains_key(&id) {
        return Err(CommunityError::NotFound(format!(
            "{} document {} not found",
            T::COLLECTION,
            id
        )));
    }
    if table
        .values()
        .any(|existing| existing.id() != id && clashes(existing, doc))
    {
        return Err(duplicate(T::COLLECTION, "unique key"));
    }
    let mut stored = doc.clone();
    stored.touch();
    table.insert(id, stored);
    Ok(())
}

fn duplicate(collection: &str, key: &str) -> CommunityError {
    CommunityError::Conflict(format!("Duplicate {} in {}", key, collection))
}

fn no_clash<T>(_: &T, _: &T) -> bool {
    false
}

fn owner_clash(a: &AddressResidentDoc, b: &AddressResidentDoc) -> bool {
    a.address_id == b.address_id && a.is_active_owner() && b.is_active_owner()
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn user(&mut self, id: ObjectId) -> Result<Option<UserDoc>> {
        Ok(get(&self.working.users, id))
    }

    async fn user_by_email(&mut self, email: &str) -> Result<Option<UserDoc>> {
        Ok(find(&self.working.users, |u| u.email == email))
    }

    async fn insert_user(&mut self, user: &UserDoc) -> Result<()> {
        insert(&mut self.working.users, user, |a, b| a.email == b.email)
    }

    async fn save_user(&mut self, user: &UserDoc) -> Result<()> {
        save(&mut self.working.users, user, |a, b| a.email == b.email)
    }

    async fn count_users(&mut self, which: UserCount) -> Result<u64> {
        let count = self
            .working
            .users
            .values()
            .filter(|u| match which {
                UserCount::All => true,
                UserCount::Verified => u.is_verified(),
                UserCount::Admins => u.is_admin,
            })
            .count();
        Ok(count as u64)
    }

    async fn town(&mut self, id: ObjectId) -> Result<Option<TownDoc>> {
        Ok(get(&self.working.towns, id))
    }

    async fn town_by_name(&mut self, name: &str) -> Result<Option<TownDoc>> {
        Ok(find(&self.working.towns, |t| t.name == name))
    }

    async fn insert_town(&mut self, town: &TownDoc) -> Result<()> {
        insert(&mut self.working.towns, town, |a, b| a.name == b.name)
    }

    async fn save_town(&mut self, town: &TownDoc) -> Result<()> {
        save(&mut self.working.towns, town, |a, b| a.name == b.name)
    }

    async fn count_towns(&mut self) -> Result<u64> {
        Ok(self.working.towns.len() as u64)
    }

    async fn street(&mut self, id: ObjectId) -> Result<Option<StreetGroupDoc>> {
        Ok(get(&self.working.streets, id))
    }

    async fn street_by_name(&mut self, town_id: ObjectId, name: &str) -> Result<Option<StreetGroupDoc>> {
        Ok(find(&self.working.streets, |s| {
            s.town_id == town_id && s.name == name
        }))
    }

    async fn insert_street(&mut self, street: &StreetGroupDoc) -> Result<()> {
        insert(&mut self.working.streets, street, |a, b| {
            a.town_id == b.town_id && a.name == b.name
        })
    }

    async fn save_street(&mut self, street: &StreetGroupDoc) -> Result<()> {
        save(&mut self.working.streets, street, |a, b| {
            a.town_id == b.town_id && a.name == b.name
        })
    }

    async fn count_streets(&mut self) -> Result<u64> {
        Ok(self.working.streets.len() as u64)
    }

    async fn address(&mut self, id: ObjectId) -> Result<Option<AddressDoc>> {
        Ok(get(&self.working.addresses, id))
    }

    async fn address_by_key(&mut self, postcode: &str, line1: &str) -> Result<Option<AddressDoc>> {
        Ok(find(&self.working.addresses, |a| {
            a.postcode == postcode && a.line1 == line1
        }))
    }

    async fn addresses_by_postcode(&mut self, postcode: &str) -> Result<Vec<AddressDoc>> {
        Ok(filter(&self.working.addresses, |a| a.postcode == postcode))
    }

    async fn insert_address(&mut self, address: &AddressDoc) -> Result<()> {
        insert(&mut self.working.addresses, address, |a, b| {
            a.postcode == b.postcode && a.line1 == b.line1
        })
    }

    async fn save_address(&mut self, address: &AddressDoc) -> Result<()> {
        save(&mut self.working.addresses, address, |a, b| {
            a.postcode == b.postcode && a.line1 == b.line1
        })
    }

    async fn resident(&mut self, id: ObjectId) -> Result<Option<AddressResidentDoc>> {
        Ok(get(&self.working.residents, id))
    }

    async fn residents(&mut self, query: &ResidentQuery) -> Result<Vec<AddressResidentDoc>> {
        Ok(filter(&self.working.residents, |r| query.matches(r)))
    }

    async fn insert_resident(&mut self, record: &AddressResidentDoc) -> Result<()> {
        insert(&mut self.working.residents, record, owner_clash)
    }

    async fn save_resident(&mut self, record: &AddressResidentDoc) -> Result<()> {
        save(&mut self.working.residents, record, owner_clash)
    }

    async fn current_membership(
        &mut self,
        user_id: ObjectId,
        street_group_id: ObjectId,
    ) -> Result<Option<StreetMembershipDoc>> {
        Ok(self
            .working
            .memberships
            .values()
            .filter(|m| m.user_id == user_id && m.street_group_id == street_group_id && m.is_open())
            .max_by_key(|m| (m.joined_at, m.id))
            .cloned())
    }

    async fn insert_membership(&mut self, membership: &StreetMembershipDoc) -> Result<()> {
        insert(&mut self.working.memberships, membership, no_clash)
    }

    async fn save_membership(&mut self, membership: &StreetMembershipDoc) -> Result<()> {
        save(&mut self.working.memberships, membership, no_clash)
    }

    async fn insert_chat_message(&mut self, message: &StreetChatMessageDoc) -> Result<()> {
        insert(&mut self.working.chat, message, no_clash)
    }

    async fn chat_page(&mut self, query: &ChatPageQuery) -> Result<Vec<StreetChatMessageDoc>> {
        Ok(self
            .working
            .chat
            .values()
            .rev()
            .filter(|m| query.matches(m))
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn post(&mut self, id: ObjectId) -> Result<Option<PostDoc>> {
        Ok(get(&self.working.posts, id))
    }

    async fn insert_post(&mut self, post: &PostDoc) -> Result<()> {
        insert(&mut self.working.posts, post, no_clash)
    }

    async fn save_post(&mut self, post: &PostDoc) -> Result<()> {
        save(&mut self.working.posts, post, no_clash)
    }

    async fn count_posts(&mut self, status: PostStatus) -> Result<u64> {
        Ok(self
            .working
            .posts
            .values()
            .filter(|p| p.status == status)
            .count() as u64)
    }

    async fn comment(&mut self, id: ObjectId) -> Result<Option<CommentDoc>> {
        Ok(get(&self.working.comments, id))
    }

    async fn insert_comment(&mut self, comment: &CommentDoc) -> Result<()> {
        insert(&mut self.working.comments, comment, no_clash)
    }

    async fn comments_for_post(&mut self, post_id: ObjectId) -> Result<Vec<CommentDoc>> {
        Ok(filter(&self.working.comments, |c| c.post_id == post_id))
    }

    async fn conversation(&mut self, id: ObjectId) -> Result<Option<ConversationDoc>> {
        Ok(get(&self.working.conversations, id))
    }

    async fn conversation_by_hash(&mut self, member_hash: &str) -> Result<Option<ConversationDoc>> {
        Ok(find(&self.working.conversations, |c| {
            c.member_hash == member_hash
        }))
    }

    async fn insert_conversation(&mut self, conversation: &ConversationDoc) -> Result<()> {
        insert(&mut self.working.conversations, conversation, |a, b| {
            a.member_hash == b.member_hash
        })
    }

    async fn save_conversation(&mut self, conversation: &ConversationDoc) -> Result<()> {
        save(&mut self.working.conversations, conversation, |a, b| {
            a.member_hash == b.member_hash
        })
    }

    async fn conversations_for(&mut self, user_id: ObjectId) -> Result<Vec<ConversationDoc>> {
        let mut conversations = filter(&self.working.conversations, |c| c.has_member(&user_id));
        conversations.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        Ok(conversations)
    }

    async fn insert_message(&mut self, message: &MessageDoc) -> Result<()> {
        insert(&mut self.working.messages, message, no_clash)
    }

    async fn messages_for(&mut self, conversation_id: ObjectId) -> Result<Vec<MessageDoc>> {
        Ok(filter(&self.working.messages, |m| {
            m.conversation_id == conversation_id
        }))
    }

    async fn report(&mut self, id: ObjectId) -> Result<Option<ReportDoc>> {
        Ok(get(&self.working.reports, id))
    }

    async fn insert_report(&mut self, report: &ReportDoc) -> Result<()> {
        insert(&mut self.working.reports, report, no_clash)
    }

    async fn save_report(&mut self, report: &ReportDoc) -> Result<()> {
        save(&mut self.working.reports, report, no_clash)
    }

    async fn reports_with_status(&mut self, status: ReportStatus) -> Result<Vec<ReportDoc>> {
        Ok(self
            .working
            .reports
            .values()
            .rev()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn count_reports(&mut self, status: ReportStatus) -> Result<u64> {
        Ok(self
            .working
            .reports
            .values()
            .filter(|r| r.status == status)
            .count() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnit {
            mut guard,
            working,
            refused_commits,
        } = *self;
        if refused_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CommunityError::Conflict("Write conflict on commit".into()));
        }
        *guard = working;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ResidentRole, ResidentState};

    #[tokio::test]
    async fn test_commit_publishes_and_abort_discards() {
        let store = MemoryStore::new();
        let user = UserDoc::new("a@b.test", "hash", "Ada", "KA12 8EE");

        let mut uow = store.begin().await.unwrap();
        uow.insert_user(&user).await.unwrap();
        uow.abort().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(uow.user(user.id).await.unwrap().is_none());
        uow.insert_user(&user).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(uow.user_by_email("a@b.test").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_unit_discards() {
        let store = MemoryStore::new();
        let town = TownDoc::new("Irvine");

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_town(&town).await.unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.count_towns().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unique_email() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_user(&UserDoc::new("a@b.test", "h", "A", "KA12 8EE"))
            .await
            .unwrap();

        let err = uow
            .insert_user(&UserDoc::new("a@b.test", "h", "B", "KA12 8EE"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommunityError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_single_active_owner_enforced() {
        let store = MemoryStore::new();
        let address_id = ObjectId::new();
        let mut uow = store.begin().await.unwrap();

        uow.insert_resident(&AddressResidentDoc::active_owner(address_id, ObjectId::new()))
            .await
            .unwrap();

        let err = uow
            .insert_resident(&AddressResidentDoc::active_owner(address_id, ObjectId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, CommunityError::Conflict(_)));

        // A pending resident on the same address is fine
        let pending = AddressResidentDoc::pending(address_id, ObjectId::new());
        uow.insert_resident(&pending).await.unwrap();

        let owners = uow
            .residents(
                &ResidentQuery::at(address_id)
                    .states(&[ResidentState::Active])
                    .role(ResidentRole::Owner),
            )
            .await
            .unwrap();
        assert_eq!(owners.len(), 1);
    }

    #[tokio::test]
    async fn test_refused_commit_discards_writes() {
        let store = MemoryStore::new();
        store.refuse_next_commits(1);

        let mut uow = store.begin().await.unwrap();
        uow.insert_town(&TownDoc::new("Irvine")).await.unwrap();
        let err = uow.commit().await.unwrap_err();
        assert!(matches!(err, CommunityError::Conflict(_)));

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.count_towns().await.unwrap(), 0);
        uow.insert_town(&TownDoc::new("Irvine")).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.count_towns().await.unwrap(), 1);
    }
}
