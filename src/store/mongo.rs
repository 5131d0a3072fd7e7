//! MongoDB store
//!
//! Each unit of work is a client session with a multi-document transaction,
//! so a coordinator operation either lands completely or not at all. Write
//! conflicts and duplicate keys surface as `Conflict` (see `From<mongodb::error::Error>`).
//! Transactions need a replica set or sharded cluster.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::ClientSession;
use tracing::info;

use super::{ChatPageQuery, ResidentQuery, Store, UnitOfWork, UserCount};
use crate::db::schemas::{
    AddressDoc, AddressResidentDoc, CommentDoc, ConversationDoc, MessageDoc, PostDoc, PostStatus,
    ReportDoc, ReportStatus, StreetChatMessageDoc, StreetGroupDoc, StreetMembershipDoc, TownDoc, UserDoc,
};
use crate::db::{MongoClient, MutMetadata, Record};
use crate::types::Result;

/// MongoDB-backed store
#[derive(Clone)]
pub struct MongoStore {
    mongo: MongoClient,
}

impl MongoStore {
    /// Wrap a connected client and make sure every collection has its indexes
    pub async fn new(mongo: MongoClient) -> Result<Self> {
        mongo.apply_indexes::<UserDoc>().await?;
        mongo.apply_indexes::<TownDoc>().await?;
        mongo.apply_indexes::<StreetGroupDoc>().await?;
        mongo.apply_indexes::<AddressDoc>().await?;
        mongo.apply_indexes::<AddressResidentDoc>().await?;
        mongo.apply_indexes::<StreetMembershipDoc>().await?;
        mongo.apply_indexes::<StreetChatMessageDoc>().await?;
        mongo.apply_indexes::<PostDoc>().await?;
        mongo.apply_indexes::<CommentDoc>().await?;
        mongo.apply_indexes::<ConversationDoc>().await?;
        mongo.apply_indexes::<MessageDoc>().await?;
        mongo.apply_indexes::<ReportDoc>().await?;

        info!("MongoDB store ready on database '{}'", mongo.db_name());
        Ok(Self { mongo })
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let mut session = self.mongo.inner().start_session().await?;
        session.start_transaction().await?;
        Ok(Box::new(MongoUnit {
            mongo: self.mongo.clone(),
            session,
        }))
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}

struct MongoUnit {
    mongo: MongoClient,
    session: ClientSession,
}

impl MongoUnit {
    async fn find_one<T: Record>(&mut self, filter: Document) -> Result<Option<T>> {
        let collection = self.mongo.collection::<T>();
        Ok(collection
            .find_one(filter)
            .session(&mut self.session)
            .await?)
    }

    async fn find_many<T: Record>(
        &mut self,
        filter: Document,
        sort: Document,
        limit: Option<i64>,
    ) -> Result<Vec<T>> {
        let collection = self.mongo.collection::<T>();
        let mut find = collection.find(filter).sort(sort);
        if let Some(limit) = limit {
            find = find.limit(limit);
        }

        let mut cursor = find.session(&mut self.session).await?;
        let mut docs = Vec::new();
        while let Some(doc) = cursor.next(&mut self.session).await {
            docs.push(doc?);
        }
        Ok(docs)
    }

    async fn count<T: Record>(&mut self, filter: Document) -> Result<u64> {
        let collection = self.mongo.collection::<T>();
        Ok(collection
            .count_documents(filter)
            .session(&mut self.session)
            .await?)
    }

    async fn insert<T: Record>(&mut self, doc: &T) -> Result<()> {
        let collection = self.mongo.collection::<T>();
        collection
            .insert_one(doc)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn replace<T: Record>(&mut self, doc: &T) -> Result<()> {
        let mut stored = doc.clone();
        stored.touch();

        let collection = self.mongo.collection::<T>();
        collection
            .replace_one(doc! { "_id": stored.id() }, &stored)
            .session(&mut self.session)
            .await?;
        Ok(())
    }
}

fn by_id(id: ObjectId) -> Document {
    doc! { "_id": id }
}

fn resident_filter(query: &ResidentQuery) -> Document {
    let mut filter = Document::new();
    if let Some(address_id) = query.address_id {
        filter.insert("address_id", address_id);
    }
    if let Some(user_id) = query.user_id {
        filter.insert("user_id", user_id);
    }
    if !query.states.is_empty() {
        let states: Vec<Bson> = query
            .states
            .iter()
            .map(|s| Bson::String(s.as_str().to_string()))
            .collect();
        filter.insert("state", doc! { "$in": states });
    }
    if let Some(role) = query.role {
        filter.insert("role", role.as_str());
    }
    filter
}

fn chat_filter(query: &ChatPageQuery) -> Document {
    let mut filter = doc! {
        "street_group_id": query.street_group_id,
        "metadata.created_at": { "$gte": query.since },
    };
    if let Some(before) = query.before {
        filter.insert("_id", doc! { "$lt": before });
    }
    filter
}

#[async_trait]
impl UnitOfWork for MongoUnit {
    async fn user(&mut self, id: ObjectId) -> Result<Option<UserDoc>> {
        self.find_one(by_id(id)).await
    }

    async fn user_by_email(&mut self, email: &str) -> Result<Option<UserDoc>> {
        self.find_one(doc! { "email": email }).await
    }

    async fn insert_user(&mut self, user: &UserDoc) -> Result<()> {
        self.insert(user).await
    }

    async fn save_user(&mut self, user: &UserDoc) -> Result<()> {
        self.replace(user).await
    }

    async fn count_users(&mut self, which: UserCount) -> Result<u64> {
        let filter = match which {
            UserCount::All => doc! {},
            UserCount::Verified => doc! { "email_verified_at": { "$ne": null } },
            UserCount::Admins => doc! { "is_admin": true },
        };
        self.count::<UserDoc>(filter).await
    }

    async fn town(&mut self, id: ObjectId) -> Result<Option<TownDoc>> {
        self.find_one(by_id(id)).await
    }

    async fn town_by_name(&mut self, name: &str) -> Result<Option<TownDoc>> {
        self.find_one(doc! { "name": name }).await
    }

    async fn insert_town(&mut self, town: &TownDoc) -> Result<()> {
        self.insert(town).await
    }

    async fn save_town(&mut self, town: &TownDoc) -> Result<()> {
        self.replace(town).await
    }

    async fn count_towns(&mut self) -> Result<u64> {
        self.count::<TownDoc>(doc! {}).await
    }

    async fn street(&mut self, id: ObjectId) -> Result<Option<StreetGroupDoc>> {
        self.find_one(by_id(id)).await
    }

    async fn street_by_name(&mut self, town_id: ObjectId, name: &str) -> Result<Option<StreetGroupDoc>> {
        self.find_one(doc! { "town_id": town_id, "name": name }).await
    }

    async fn insert_street(&mut self, street: &StreetGroupDoc) -> Result<()> {
        self.insert(street).await
    }

    async fn save_street(&mut self, street: &StreetGroupDoc) -> Result<()> {
        self.replace(street).await
    }

    async fn count_streets(&mut self) -> Result<u64> {
        self.count::<StreetGroupDoc>(doc! {}).await
    }

    async fn address(&mut self, id: ObjectId) -> Result<Option<AddressDoc>> {
        self.find_one(by_id(id)).await
    }

    async fn address_by_key(&mut self, postcode: &str, line1: &str) -> Result<Option<AddressDoc>> {
        self.find_one(doc! { "postcode": postcode, "line1": line1 }).await
    }

    async fn addresses_by_postcode(&mut self, postcode: &str) -> Result<Vec<AddressDoc>> {
        self.find_many(doc! { "postcode": postcode }, doc! { "line1": 1 }, None)
            .await
    }

    async fn insert_address(&mut self, address: &AddressDoc) -> Result<()> {
        self.insert(address).await
    }

    async fn save_address(&mut self, address: &AddressDoc) -> Result<()> {
        self.replace(address).await
    }

    async fn resident(&mut self, id: ObjectId) -> Result<Option<AddressResidentDoc>> {
        self.find_one(by_id(id)).await
    }

    async fn residents(&mut self, query: &ResidentQuery) -> Result<Vec<AddressResidentDoc>> {
        self.find_many(resident_filter(query), doc! { "_id": 1 }, None)
            .await
    }

    async fn insert_resident(&mut self, record: &AddressResidentDoc) -> Result<()> {
        self.insert(record).await
    }

    async fn save_resident(&mut self, record: &AddressResidentDoc) -> Result<()> {
        self.replace(record).await
    }

    async fn current_membership(
        &mut self,
        user_id: ObjectId,
        street_group_id: ObjectId,
    ) -> Result<Option<StreetMembershipDoc>> {
        let mut latest = self
            .find_many::<StreetMembershipDoc>(
                doc! {
                    "user_id": user_id,
                    "street_group_id": street_group_id,
                    "left_at": null,
                },
                doc! { "joined_at": -1, "_id": -1 },
                Some(1),
            )
            .await?;
        Ok(latest.pop())
    }

    async fn insert_membership(&mut self, membership: &StreetMembershipDoc) -> Result<()> {
        self.insert(membership).await
    }

    async fn save_membership(&mut self, membership: &StreetMembershipDoc) -> Result<()> {
        self.replace(membership).await
    }

    async fn insert_chat_message(&mut self, message: &StreetChatMessageDoc) -> Result<()> {
        self.insert(message).await
    }

    async fn chat_page(&mut self, query: &ChatPageQuery) -> Result<Vec<StreetChatMessageDoc>> {
        self.find_many(chat_filter(query), doc! { "_id": -1 }, Some(query.limit))
            .await
    }

    async fn post(&mut self, id: ObjectId) -> Result<Option<PostDoc>> {
        self.find_one(by_id(id)).await
    }

    async fn insert_post(&mut self, post: &PostDoc) -> Result<()> {
        self.insert(post).await
    }

    async fn save_post(&mut self, post: &PostDoc) -> Result<()> {
        self.replace(post).await
    }

    async fn count_posts(&mut self, status: PostStatus) -> Result<u64> {
        self.count::<PostDoc>(doc! { "status": status.as_str() }).await
    }

    async fn comment(&mut self, id: ObjectId) -> Result<Option<CommentDoc>> {
        self.find_one(by_id(id)).await
    }

    async fn insert_comment(&mut self, comment: &CommentDoc) -> Result<()> {
        self.insert(comment).await
    }

    async fn comments_for_post(&mut self, post_id: ObjectId) -> Result<Vec<CommentDoc>> {
        self.find_many(doc! { "post_id": post_id }, doc! { "_id": 1 }, None)
            .await
    }

    async fn conversation(&mut self, id: ObjectId) -> Result<Option<ConversationDoc>> {
        self.find_one(by_id(id)).await
    }

    async fn conversation_by_hash(&mut self, member_hash: &str) -> Result<Option<ConversationDoc>> {
        self.find_one(doc! { "member_hash": member_hash }).await
    }

    async fn insert_conversation(&mut self, conversation: &ConversationDoc) -> Result<()> {
        self.insert(conversation).await
    }

    async fn save_conversation(&mut self, conversation: &ConversationDoc) -> Result<()> {
        self.replace(conversation).await
    }

    async fn conversations_for(&mut self, user_id: ObjectId) -> Result<Vec<ConversationDoc>> {
        let mut conversations = self
            .find_many::<ConversationDoc>(doc! { "member_ids": user_id }, doc! { "_id": -1 }, None)
            .await?;
        conversations.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        Ok(conversations)
    }

    async fn insert_message(&mut self, message: &MessageDoc) -> Result<()> {
        self.insert(message).await
    }

    async fn messages_for(&mut self, conversation_id: ObjectId) -> Result<Vec<MessageDoc>> {
        self.find_many(
            doc! { "conversation_id": conversation_id },
            doc! { "_id": 1 },
            None,
        )
        .await
    }

    async fn report(&mut self, id: ObjectId) -> Result<Option<ReportDoc>> {
        self.find_one(by_id(id)).await
    }

    async fn insert_report(&mut self, report: &ReportDoc) -> Result<()> {
        self.insert(report).await
    }

    async fn save_report(&mut self, report: &ReportDoc) -> Result<()> {
        self.replace(report).await
    }

    async fn reports_with_status(&mut self, status: ReportStatus) -> Result<Vec<ReportDoc>> {
        self.find_many(doc! { "status": status.as_str() }, doc! { "_id": -1 }, None)
            .await
    }

    async fn count_reports(&mut self, status: ReportStatus) -> Result<u64> {
        self.count::<ReportDoc>(doc! { "status": status.as_str() })
            .await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut unit = *self;
        unit.session.commit_transaction().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        let mut unit = *self;
        unit.session.abort_transaction().await?;
        Ok(())
    }
}
