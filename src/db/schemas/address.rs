//! Address document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{index, IntoIndexes, MutMetadata, Record};
use crate::db::schemas::Metadata;

pub const ADDRESS_COLLECTION: &str = "addresses";

/// A physical address, unique per (postcode, line1). Never deleted.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AddressDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    pub line1: String,

    #[serde(default)]
    pub line2: Option<String>,

    pub town: String,

    /// Upper-cased
    pub postcode: String,

    #[serde(default)]
    pub owner_user_id: Option<ObjectId>,

    #[serde(default)]
    pub resident_count: i64,

    /// Street the address belongs to
    pub street_group_id: ObjectId,

    pub town_id: ObjectId,
}

pub struct NewAddress<'a> {
    pub line1: &'a str,
    pub line2: Option<&'a str>,
    pub town: &'a str,
    pub postcode: &'a str,
    pub street_group_id: ObjectId,
    pub town_id: ObjectId,
}

impl AddressDoc {
    pub fn new(input: NewAddress<'_>) -> Self {
        Self {
            id: ObjectId::new(),
            metadata: Metadata::new(),
            line1: input.line1.to_string(),
            line2: input.line2.map(str::to_string),
            town: input.town.to_string(),
            postcode: normalize_postcode(input.postcode),
            owner_user_id: None,
            resident_count: 0,
            street_group_id: input.street_group_id,
            town_id: input.town_id,
        }
    }
}

/// Postcodes are stored and compared upper-cased
pub fn normalize_postcode(postcode: &str) -> String {
    postcode.trim().to_uppercase()
}

impl IntoIndexes for AddressDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            index(
                doc! { "postcode": 1, "line1": 1 },
                "postcode_line1_unique",
                true,
            ),
            index(doc! { "street_group_id": 1 }, "street_index", false),
        ]
    }
}

impl MutMetadata for AddressDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for AddressDoc {
    const COLLECTION: &'static str = ADDRESS_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postcode_normalized() {
        assert_eq!(normalize_postcode("  ka12 8ee "), "KA12 8EE");

        let address = AddressDoc::new(NewAddress {
            line1: "1 High Street",
            line2: None,
            town: "Irvine",
            postcode: "ka12 8ee",
            street_group_id: ObjectId::new(),
            town_id: ObjectId::new(),
        });
        assert_eq!(address.postcode, "KA12 8EE");
        assert_eq!(address.resident_count, 0);
        assert!(address.owner_user_id.is_none());
    }
}
