//! Database layer
//!
//! MongoDB client, schema traits and document schemas.

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MutMetadata, Record};
