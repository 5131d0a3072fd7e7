//! MongoDB client and schema traits

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    options::{ClientOptions, IndexOptions},
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::db::schemas::Metadata;
use crate::types::CommunityError;

const SELECTION_TIMEOUT: Duration = Duration::from_secs(3);

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;

    /// Stamp the document as updated now
    fn touch(&mut self) {
        self.mut_metadata().updated_at = DateTime::now();
    }
}

/// A document stored in its own collection, addressed by `_id`
pub trait Record:
    Serialize + DeserializeOwned + Clone + Unpin + Send + Sync + IntoIndexes + MutMetadata + 'static
{
    const COLLECTION: &'static str;

    fn id(&self) -> ObjectId;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect, then check the deployment can run multi-document transactions
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, CommunityError> {
        info!("Connecting to MongoDB at {}", uri);

        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| CommunityError::Config(format!("Bad MongoDB URI: {}", e)))?;
        options.server_selection_timeout = Some(SELECTION_TIMEOUT);
        options.connect_timeout = Some(SELECTION_TIMEOUT);
        options.app_name = Some("connected-community".into());

        let client = Client::with_options(options)
            .map_err(|e| CommunityError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        let hello = client
            .database(db_name)
            .run_command(doc! { "hello": 1 })
            .await
            .map_err(|e| CommunityError::Database(format!("MongoDB unreachable: {}", e)))?;
        if !supports_transactions(&hello) {
            return Err(CommunityError::Config(
                "MongoDB must run as a replica set or sharded cluster".into(),
            ));
        }

        info!("Connected to MongoDB database '{}'", db_name);
        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Typed handle on a record's collection
    pub fn collection<T: Record>(&self) -> Collection<T> {
        self.client.database(&self.db_name).collection::<T>(T::COLLECTION)
    }

    /// Create the indexes a record declares
    pub async fn apply_indexes<T: Record>(&self) -> Result<(), CommunityError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.collection::<T>()
            .create_indexes(indices)
            .await
            .map_err(|e| CommunityError::Database(format!("Failed to create indexes: {}", e)))?;

        debug!("Indexes applied to '{}'", T::COLLECTION);
        Ok(())
    }

    /// Sessions are opened here
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// A `hello` reply from a replica set member or a mongos
fn supports_transactions(hello: &Document) -> bool {
    hello.get_str("setName").is_ok() || hello.get_str("msg").is_ok_and(|m| m == "isdbgrid")
}

/// Build a named index, optionally unique
pub(crate) fn index(keys: Document, name: &str, unique: bool) -> (Document, Option<IndexOptions>) {
    (
        keys,
        Some(
            IndexOptions::builder()
                .unique(unique)
                .name(name.to_string())
                .build(),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_support_detected() {
        assert!(supports_transactions(&doc! { "isWritablePrimary": true, "setName": "rs0" }));
        assert!(supports_transactions(&doc! { "msg": "isdbgrid" }));
        assert!(!supports_transactions(&doc! { "isWritablePrimary": true }));
    }

    #[test]
    fn test_index_options() {
        let (keys, options) = index(doc! { "email": 1 }, "email_unique", true);
        assert_eq!(keys, doc! { "email": 1 });
        let options = options.unwrap();
        assert_eq!(options.unique, Some(true));
        assert_eq!(options.name.as_deref(), Some("email_unique"));
    }
}
