//! Common metadata for all documents

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Creation and update timestamps carried by every document
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Metadata {
    /// When the document was created
    pub created_at: DateTime,

    /// When the document was last updated
    pub updated_at: DateTime,
}

impl Metadata {
    /// Create new metadata with current timestamp
    pub fn new() -> Self {
        let now = DateTime::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    /// Metadata for a document created at a specific instant
    pub fn at(created_at: DateTime) -> Self {
        Self {
            created_at,
            updated_at: created_at,
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}
